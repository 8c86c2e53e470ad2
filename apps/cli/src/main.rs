use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{ConnectionAction, ConnectionListsView, DiscoveryFilter, ListView, MentorshipClient};
use shared::{
    domain::{ConnectionId, Role, UserId},
    protocol::{Paginated, ProfileSummary, ProfileUpdate, RegisterRequest, RelationshipStanding},
    tags,
};
use tracing_subscriber::EnvFilter;
use url::Url;

mod config;

use config::{clear_session, load_session, load_settings, save_session, Settings, StoredSession};

#[derive(Parser, Debug)]
#[command(name = "mentormesh", about = "Mentorship-matching client")]
struct Cli {
    /// Backend API base URL; overrides mentormesh.toml and MENTORMESH_SERVER_URL.
    #[arg(long)]
    server_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account.
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
    },
    /// Sign in and save the session for later commands.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Sign out and drop the saved session.
    Logout,
    /// Show the saved session identity.
    Whoami,
    /// Show or edit a profile.
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
    /// Browse mentor/mentee profiles with filters and search.
    Discover {
        #[arg(long)]
        role: Option<String>,
        /// Comma-separated skills to match.
        #[arg(long)]
        skills: Option<String>,
        /// Comma-separated interests to match.
        #[arg(long)]
        interests: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        page: Option<u32>,
    },
    /// Show incoming, sent and current connections.
    Connections,
    /// Send a connection request to a user.
    Connect { user_id: i64 },
    /// Accept an incoming request.
    Accept { connection_id: i64 },
    /// Decline an incoming request.
    Decline { connection_id: i64 },
    /// Cancel a request you sent.
    Cancel { connection_id: i64 },
    /// Remove an existing connection.
    Remove { connection_id: i64 },
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    Show {
        /// Another user's id; defaults to your own profile.
        #[arg(long)]
        user_id: Option<i64>,
    },
    Edit {
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        headline: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        /// Comma-separated skills; replaces the stored list.
        #[arg(long)]
        skills: Option<String>,
        /// Comma-separated interests; replaces the stored list.
        #[arg(long)]
        interests: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        linkedin_url: Option<String>,
        #[arg(long)]
        website_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }
    Url::parse(&settings.server_url)
        .with_context(|| format!("invalid server url '{}'", settings.server_url))?;
    let client = MentorshipClient::new(settings.server_url.clone());

    match cli.command {
        Command::Register {
            username,
            email,
            password,
            first_name,
            last_name,
        } => {
            client
                .register(&RegisterRequest {
                    username: username.clone(),
                    email,
                    password,
                    first_name,
                    last_name,
                })
                .await?;
            println!("Account '{username}' created. Sign in with `mentormesh login`.");
        }
        Command::Login { username, password } => {
            let user = client.login(&username, &password).await?;
            let snapshot = client
                .session_snapshot()
                .await
                .ok_or_else(|| anyhow!("session missing after login"))?;
            save_session(&settings.session_file, &StoredSession::from_snapshot(&snapshot))?;
            println!("Signed in as {} ({}).", user.name, user.username);
        }
        Command::Logout => {
            resume_session(&client, &settings).await?;
            client.logout().await?;
            clear_session(&settings.session_file)?;
            println!("Signed out.");
        }
        Command::Whoami => match load_session(&settings.session_file)? {
            Some(session) => {
                println!("{} ({}) <{}>", session.name, session.username, session.email)
            }
            None => println!("Not signed in."),
        },
        Command::Profile { command } => match command {
            ProfileCommand::Show { user_id } => {
                let has_session = try_resume_session(&client, &settings).await?;
                let profile = match user_id {
                    Some(id) => client.profile_of(UserId(id)).await?,
                    None => {
                        if !has_session {
                            bail!("no saved session; run `mentormesh login` first");
                        }
                        client.my_profile().await?
                    }
                };
                print_profile(&profile);
            }
            ProfileCommand::Edit {
                role,
                headline,
                bio,
                skills,
                interests,
                location,
                linkedin_url,
                website_url,
            } => {
                resume_session(&client, &settings).await?;
                let update = ProfileUpdate {
                    role: role.as_deref().map(parse_role).transpose()?,
                    headline,
                    bio,
                    skills: skills.as_deref().map(|raw| tags::join(&tags::split(raw))),
                    interests: interests.as_deref().map(|raw| tags::join(&tags::split(raw))),
                    location,
                    linkedin_url,
                    website_url,
                };
                let profile = client.update_profile(&update).await?;
                println!("Profile updated.");
                print_profile(&profile);
            }
        },
        Command::Discover {
            role,
            skills,
            interests,
            search,
            page,
        } => {
            try_resume_session(&client, &settings).await?;
            let filter = DiscoveryFilter {
                role: role.as_deref().map(parse_role).transpose()?,
                skills: skills.as_deref().map(tags::split).unwrap_or_default(),
                interests: interests.as_deref().map(tags::split).unwrap_or_default(),
                search,
                page,
            };
            let page = client.discover(&filter).await?;
            print_discovery(&page);
        }
        Command::Connections => {
            resume_session(&client, &settings).await?;
            match client.load_connections().await {
                Ok(view) => render_lists(&view),
                Err(err) => {
                    // The stored view carries the error text in place of the
                    // lists, same as the page would show.
                    tracing::debug!(error = %err, "connections: load failed");
                    if let Some(view) = client.lists_view().await {
                        render_lists(&view);
                    }
                }
            }
        }
        Command::Connect { user_id } => {
            resume_session(&client, &settings).await?;
            let record = client.send_request(UserId(user_id)).await?;
            println!(
                "Connection request #{} sent to {}.",
                record.id.0,
                record.receiver.display_name()
            );
        }
        Command::Accept { connection_id } => {
            run_action(&client, &settings, ConnectionId(connection_id), ConnectionAction::Accept)
                .await?
        }
        Command::Decline { connection_id } => {
            run_action(&client, &settings, ConnectionId(connection_id), ConnectionAction::Decline)
                .await?
        }
        Command::Cancel { connection_id } => {
            run_action(&client, &settings, ConnectionId(connection_id), ConnectionAction::Cancel)
                .await?
        }
        Command::Remove { connection_id } => {
            run_action(&client, &settings, ConnectionId(connection_id), ConnectionAction::Remove)
                .await?
        }
    }

    Ok(())
}

async fn run_action(
    client: &MentorshipClient,
    settings: &Settings,
    id: ConnectionId,
    action: ConnectionAction,
) -> Result<()> {
    resume_session(client, settings).await?;
    client
        .load_connections()
        .await
        .map_err(|err| anyhow!("could not load connections: {err}"))?;
    client.submit_action(id, action).await?;
    if let Some(view) = client.lists_view().await {
        render_lists(&view);
    }
    Ok(())
}

async fn resume_session(client: &MentorshipClient, settings: &Settings) -> Result<()> {
    if !try_resume_session(client, settings).await? {
        bail!("no saved session; run `mentormesh login` first");
    }
    Ok(())
}

async fn try_resume_session(client: &MentorshipClient, settings: &Settings) -> Result<bool> {
    match load_session(&settings.session_file)? {
        Some(stored) => {
            client.resume(stored.into_snapshot()).await;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn parse_role(raw: &str) -> Result<Role> {
    if raw.eq_ignore_ascii_case("mentor") {
        Ok(Role::Mentor)
    } else if raw.eq_ignore_ascii_case("mentee") {
        Ok(Role::Mentee)
    } else {
        bail!("role must be 'mentor' or 'mentee', got '{raw}'")
    }
}

fn standing_label(standing: RelationshipStanding) -> &'static str {
    match standing {
        RelationshipStanding::None => "not connected",
        RelationshipStanding::Own => "this is you",
        RelationshipStanding::Connected => "connected",
        RelationshipStanding::PendingSent => "request sent",
        RelationshipStanding::PendingReceived => "request received",
    }
}

fn print_profile(profile: &ProfileSummary) {
    println!("{} (@{})", profile.name, profile.user.username);
    if let Some(role) = profile.role {
        println!("  role: {}", role.as_str());
    }
    if let Some(headline) = profile.headline.as_deref().filter(|h| !h.is_empty()) {
        println!("  {headline}");
    }
    if let Some(bio) = profile.bio.as_deref().filter(|b| !b.is_empty()) {
        println!("  {bio}");
    }
    if !profile.skills_list.is_empty() {
        println!("  skills: {}", profile.skills_list.join(", "));
    }
    if !profile.interests_list.is_empty() {
        println!("  interests: {}", profile.interests_list.join(", "));
    }
    if let Some(location) = profile.location.as_deref().filter(|l| !l.is_empty()) {
        println!("  location: {location}");
    }
    if let Some(linkedin) = profile.linkedin_url.as_deref().filter(|u| !u.is_empty()) {
        println!("  linkedin: {linkedin}");
    }
    if let Some(website) = profile.website_url.as_deref().filter(|u| !u.is_empty()) {
        println!("  website: {website}");
    }
    println!("  standing: {}", standing_label(profile.connection_status));
}

fn print_discovery(page: &Paginated<ProfileSummary>) {
    println!("{} profile(s) found", page.count);
    for profile in &page.results {
        let role = profile
            .role
            .map(|role| format!(" [{}]", role.as_str()))
            .unwrap_or_default();
        println!("  #{} {}{}", profile.user.id.0, profile.name, role);
        if let Some(headline) = profile.headline.as_deref().filter(|h| !h.is_empty()) {
            println!("      {headline}");
        }
        if !profile.skills_list.is_empty() {
            println!("      skills: {}", profile.skills_list.join(", "));
        }
        println!("      standing: {}", standing_label(profile.connection_status));
    }
    if page.next.is_some() {
        println!("  (more results on the next page)");
    }
}

fn render_lists(view: &ConnectionListsView) {
    if let Some(error) = &view.load_error {
        println!("Could not load connections: {error}");
        return;
    }
    render_list("Incoming Requests", &view.incoming, "No incoming requests.");
    render_list("Sent Requests", &view.outgoing, "No sent requests.");
    render_list(
        "Your Connections",
        &view.current,
        "You have no connections yet.",
    );
}

fn render_list(title: &str, list: &ListView, placeholder: &str) {
    println!("== {title} ==");
    if list.placeholder_visible {
        println!("  {placeholder}");
    }
    for item in &list.items {
        let role = item
            .counterpart
            .role()
            .map(|role| format!(" [{}]", role.as_str()))
            .unwrap_or_default();
        let actions = item
            .controls
            .iter()
            .map(|control| control.label.to_lowercase())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  #{} {}{} (actions: {actions})",
            item.id.0,
            item.counterpart.display_name(),
            role
        );
    }
    println!();
}
