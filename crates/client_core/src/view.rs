//! Rendered three-list view consumed by front ends. Holds no transition
//! logic; it renders buckets and applies patches produced by [`crate::lists`].

use chrono::{DateTime, Utc};
use shared::{
    domain::{Bucket, ConnectionId, ConnectionStatus, Role, UserId},
    protocol::{BasicUser, ConnectionBuckets, ConnectionRecord, ProfileCard},
};
use thiserror::Error;

use crate::lists::{ConnectionAction, ListPatch};

pub const UNKNOWN_USER_LABEL: &str = "Unknown User";

/// The non-viewer side of a connection. When neither side matches the viewer
/// the item renders the historical "Unknown User" fallback instead of
/// failing; the backend should never produce such a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Counterpart {
    Known {
        user: BasicUser,
        card: Option<ProfileCard>,
    },
    Unknown,
}

impl Counterpart {
    pub fn resolve(record: &ConnectionRecord, viewer: UserId) -> Self {
        if record.requester.id == viewer {
            Counterpart::Known {
                user: record.receiver.clone(),
                card: record.receiver_profile.clone(),
            }
        } else if record.receiver.id == viewer {
            Counterpart::Known {
                user: record.requester.clone(),
                card: record.requester_profile.clone(),
            }
        } else {
            Counterpart::Unknown
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Counterpart::Known { user, .. } => user.display_name(),
            Counterpart::Unknown => UNKNOWN_USER_LABEL.to_string(),
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Counterpart::Known { user, .. } => Some(user.id),
            Counterpart::Unknown => None,
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            Counterpart::Known { card, .. } => card.as_ref().and_then(|card| card.role),
            Counterpart::Unknown => None,
        }
    }
}

pub fn idle_label(action: ConnectionAction) -> &'static str {
    match action {
        ConnectionAction::Accept => "Accept",
        ConnectionAction::Decline => "Decline",
        ConnectionAction::Cancel => "Cancel Request",
        ConnectionAction::Remove => "Remove",
    }
}

pub fn busy_label(action: ConnectionAction) -> &'static str {
    match action {
        ConnectionAction::Accept => "Accepting...",
        ConnectionAction::Decline => "Declining...",
        ConnectionAction::Cancel => "Cancelling...",
        ConnectionAction::Remove => "Removing...",
    }
}

/// Actions offered on items of a given list.
pub fn bucket_actions(bucket: Bucket) -> &'static [ConnectionAction] {
    match bucket {
        Bucket::Incoming => &[ConnectionAction::Accept, ConnectionAction::Decline],
        Bucket::Outgoing => &[ConnectionAction::Cancel],
        Bucket::Current => &[ConnectionAction::Remove],
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionControl {
    pub action: ConnectionAction,
    pub label: String,
    pub enabled: bool,
}

impl ActionControl {
    fn new(action: ConnectionAction) -> Self {
        Self {
            action,
            label: idle_label(action).to_string(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub id: ConnectionId,
    pub counterpart: Counterpart,
    pub status: ConnectionStatus,
    pub requested_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub controls: Vec<ActionControl>,
}

impl ListItem {
    fn render(record: &ConnectionRecord, bucket: Bucket, viewer: UserId) -> Self {
        Self {
            id: record.id,
            counterpart: Counterpart::resolve(record, viewer),
            status: record.status,
            requested_at: record.created_at,
            accepted_at: record.accepted_at,
            controls: bucket_actions(bucket)
                .iter()
                .copied()
                .map(ActionControl::new)
                .collect(),
        }
    }

    pub fn in_flight(&self) -> bool {
        self.controls.iter().any(|control| !control.enabled)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListView {
    pub items: Vec<ListItem>,
    pub placeholder_visible: bool,
}

impl Default for ListView {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            placeholder_visible: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ViewError {
    #[error("connection {0} is not rendered in the expected list")]
    Missing(i64),
    #[error("connection {0} already has an action in flight")]
    Busy(i64),
}

/// The three rendered lists plus the load-failure text that replaces them.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionListsView {
    viewer: UserId,
    pub incoming: ListView,
    pub outgoing: ListView,
    pub current: ListView,
    pub load_error: Option<String>,
}

impl ConnectionListsView {
    pub fn empty(viewer: UserId) -> Self {
        Self {
            viewer,
            incoming: ListView::default(),
            outgoing: ListView::default(),
            current: ListView::default(),
            load_error: None,
        }
    }

    /// Renders a fresh server load. Repeated ids keep their first occurrence,
    /// mirroring [`crate::lists::ListsState::from_buckets`].
    pub fn render(viewer: UserId, buckets: &ConnectionBuckets) -> Self {
        let mut view = Self::empty(viewer);
        let mut seen = std::collections::HashSet::new();
        for (bucket, records) in [
            (Bucket::Incoming, &buckets.incoming),
            (Bucket::Outgoing, &buckets.outgoing),
            (Bucket::Current, &buckets.current),
        ] {
            for record in records {
                if seen.insert(record.id) {
                    view.list_mut(bucket)
                        .items
                        .push(ListItem::render(record, bucket, viewer));
                }
            }
        }
        for bucket in Bucket::ALL {
            let list = view.list_mut(bucket);
            list.placeholder_visible = list.items.is_empty();
        }
        view
    }

    /// A failed load: the error text stands in for all three lists and no
    /// stale items survive.
    pub fn failed(viewer: UserId, message: impl Into<String>) -> Self {
        Self {
            load_error: Some(message.into()),
            ..Self::empty(viewer)
        }
    }

    pub fn viewer(&self) -> UserId {
        self.viewer
    }

    pub fn list(&self, bucket: Bucket) -> &ListView {
        match bucket {
            Bucket::Incoming => &self.incoming,
            Bucket::Outgoing => &self.outgoing,
            Bucket::Current => &self.current,
        }
    }

    fn list_mut(&mut self, bucket: Bucket) -> &mut ListView {
        match bucket {
            Bucket::Incoming => &mut self.incoming,
            Bucket::Outgoing => &mut self.outgoing,
            Bucket::Current => &mut self.current,
        }
    }

    pub fn item(&self, id: ConnectionId) -> Option<&ListItem> {
        Bucket::ALL
            .iter()
            .flat_map(|bucket| self.list(*bucket).items.iter())
            .find(|item| item.id == id)
    }

    pub fn total_items(&self) -> usize {
        Bucket::ALL
            .iter()
            .map(|bucket| self.list(*bucket).items.len())
            .sum()
    }

    /// Disables the item's controls for the duration of a request and swaps
    /// the triggering control to its busy label. Rejects the call when the
    /// item is absent from the action's list or already has a request in
    /// flight, which is the duplicate-submission guard.
    pub fn begin_action(
        &mut self,
        id: ConnectionId,
        action: ConnectionAction,
    ) -> Result<(), ViewError> {
        let bucket = action.source_slot().bucket();
        let item = self
            .list_mut(bucket)
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(ViewError::Missing(id.0))?;
        if item.in_flight() {
            return Err(ViewError::Busy(id.0));
        }
        for control in &mut item.controls {
            control.enabled = false;
            if control.action == action {
                control.label = busy_label(action).to_string();
            }
        }
        Ok(())
    }

    /// Puts an item's controls back to their idle labels and enabled state
    /// after a failed request.
    pub fn restore_controls(&mut self, id: ConnectionId) {
        for bucket in Bucket::ALL {
            if let Some(item) = self
                .list_mut(bucket)
                .items
                .iter_mut()
                .find(|item| item.id == id)
            {
                for control in &mut item.controls {
                    control.enabled = true;
                    control.label = idle_label(control.action).to_string();
                }
                return;
            }
        }
    }

    pub fn apply(&mut self, patch: &ListPatch) {
        match patch {
            ListPatch::Remove { bucket, id } => {
                self.list_mut(*bucket).items.retain(|item| item.id != *id);
            }
            ListPatch::Insert { bucket, record } => {
                let viewer = self.viewer;
                let item = ListItem::render(record, *bucket, viewer);
                self.list_mut(*bucket).items.push(item);
            }
            ListPatch::SetPlaceholder { bucket, visible } => {
                self.list_mut(*bucket).placeholder_visible = *visible;
            }
        }
    }

    pub fn apply_all(&mut self, patches: &[ListPatch]) {
        for patch in patches {
            self.apply(patch);
        }
    }
}
