use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use cw_cli::card::{ConnectionProfile, FileCardStorage, IdCard, IdentityCardService};
use cw_cli::config::WalletConfig;
use cw_cli::form::{CardForm, FormEvent};
use cw_cli::home::ensure_home_dir;
use cw_cli::output::{CommandOutput, OutputFormat};
use cw_cli::services::{ActiveIdentityFile, LocalAdminService, LocalProfileService};
use dialoguer::Confirm;
use serde_json::{json, Value};
use tokio::sync::mpsc::unbounded_channel;
use tracing_subscriber::EnvFilter;

const CARDS_DIR: &str = "cards";

#[derive(Parser, Debug)]
#[command(
    name = "card",
    version,
    about = "Manage the identity cards in the local wallet."
)]
struct Cli {
    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        default_value_t = OutputFormat::Text,
        global = true
    )]
    output: OutputFormat,

    #[arg(short = 'y', long = "yes", global = true)]
    assume_yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Seed an empty wallet with the default admin card.
    Init,
    /// Add a new identity card.
    Create {
        /// User id the card identifies.
        user: String,

        /// Business network the card belongs to; omit for an admin card.
        #[arg(long = "network", value_name = "NAME")]
        network: Option<String>,

        /// Enrollment secret, used instead of a certificate and key.
        #[arg(long = "secret", value_name = "SECRET", conflicts_with_all = ["certificate", "private_key"])]
        secret: Option<String>,

        /// PEM certificate file.
        #[arg(long = "certificate", value_name = "PATH", requires = "private_key")]
        certificate: Option<PathBuf>,

        /// PEM private key file.
        #[arg(long = "private-key", value_name = "PATH", requires = "certificate")]
        private_key: Option<PathBuf>,

        /// Grant the PeerAdmin role.
        #[arg(long)]
        peer_admin: bool,

        /// Grant the ChannelAdmin role.
        #[arg(long)]
        channel_admin: bool,

        /// Connection profile JSON file (defaults to the configured profile).
        #[arg(long = "profile", value_name = "PATH")]
        profile: Option<PathBuf>,
    },
    /// List the cards in the wallet.
    List,
    /// Show one card (defaults to the current card).
    Show {
        #[arg(value_name = "REF")]
        target: Option<String>,
    },
    /// Make a card the current identity, activating it if needed.
    Use {
        #[arg(value_name = "REF")]
        target: String,
    },
    /// Provision a card's connection profile and credentials.
    Activate {
        #[arg(value_name = "REF")]
        target: String,
    },
    /// Export a card, with live credentials once it has been used.
    Export {
        #[arg(value_name = "REF")]
        target: String,

        /// Output file path; stdout if omitted.
        #[arg(short = 'f', long = "file", value_name = "PATH")]
        file: Option<PathBuf>,
    },
    /// Delete a card from the wallet.
    Delete {
        #[arg(value_name = "REF")]
        target: String,

        /// Allow deleting an indestructible card.
        #[arg(long)]
        force: bool,
    },
}

struct CommandContext {
    output: OutputFormat,
    assume_yes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let ctx = CommandContext {
        output: cli.output,
        assume_yes: cli.assume_yes,
    };

    let home = ensure_home_dir()?;
    let config = WalletConfig::read_or_create(&home)?;
    let mut service = open_service(&home)?;
    service.load_identity_cards(config.local_only).await?;

    let output = match cli.command {
        Commands::Init => handle_init(&mut service).await,
        Commands::Create {
            user,
            network,
            secret,
            certificate,
            private_key,
            peer_admin,
            channel_admin,
            profile,
        } => {
            let profile = match profile {
                Some(path) => read_profile(&path)?,
                None => config.default_profile.clone(),
            };
            let request = CreateRequest {
                user,
                network,
                secret,
                certificate,
                private_key,
                peer_admin,
                channel_admin,
                profile,
            };
            handle_create(&mut service, request).await
        }
        Commands::List => handle_list(&service),
        Commands::Show { target } => handle_show(&home, &service, target),
        Commands::Use { target } => handle_use(&mut service, target).await,
        Commands::Activate { target } => handle_activate(&mut service, target).await,
        Commands::Export { target, file } => handle_export(&service, target, file).await,
        Commands::Delete { target, force } => {
            handle_delete(&ctx, &mut service, target, force).await
        }
    }?;

    output.render(ctx.output)?;
    Ok(())
}

fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn open_service(home: &Path) -> Result<IdentityCardService> {
    let storage = FileCardStorage::new(home.join(CARDS_DIR))?;
    Ok(IdentityCardService::new(
        Arc::new(storage),
        Arc::new(LocalAdminService::new(home)?),
        Arc::new(LocalProfileService::new(home)?),
        Arc::new(ActiveIdentityFile::new(home)),
    ))
}

async fn handle_init(service: &mut IdentityCardService) -> Result<CommandOutput> {
    match service.add_initial_identity_cards(None).await? {
        Some(refs) => Ok(CommandOutput::new(
            format!("Added {} initial identity card(s)", refs.len()),
            json!({
                "command": "init",
                "added": refs,
            }),
        )),
        None => Ok(CommandOutput::new(
            "Wallet already holds identity cards; nothing added",
            json!({
                "command": "init",
                "added": [],
            }),
        )),
    }
}

struct CreateRequest {
    user: String,
    network: Option<String>,
    secret: Option<String>,
    certificate: Option<PathBuf>,
    private_key: Option<PathBuf>,
    peer_admin: bool,
    channel_admin: bool,
    profile: ConnectionProfile,
}

async fn handle_create(
    service: &mut IdentityCardService,
    request: CreateRequest,
) -> Result<CommandOutput> {
    let (tx, mut rx) = unbounded_channel();
    let mut form = CardForm::new(request.profile, tx);
    form.user_id = Some(request.user.clone());
    form.use_participant_card_type(request.network.is_some());
    form.business_network = request.network;
    form.peer_admin = request.peer_admin;
    form.channel_admin = request.channel_admin;
    match (request.certificate, request.private_key) {
        (Some(cert), Some(key)) => {
            form.use_certificates(true);
            form.certificate = Some(read_text(&cert)?);
            form.private_key = Some(read_text(&key)?);
        }
        _ => {
            form.use_certificates(false);
            form.user_secret = request.secret;
        }
    }

    if !form.valid_contents() {
        bail!(
            "incomplete card: supply --secret or --certificate/--private-key, and --network or an admin role"
        );
    }

    let added = form.add_identity_card(service).await;
    drop(form);

    let mut error = None;
    while let Some(event) = rx.recv().await {
        if let FormEvent::Error(message) = event {
            error = Some(message);
        }
    }
    let Some(reference) = added else {
        return Err(anyhow!(error.unwrap_or_else(|| "failed to add identity card".to_string())));
    };
    Ok(CommandOutput::new(
        format!("Added identity card {reference} for '{}'", request.user),
        json!({
            "command": "create",
            "reference": reference,
            "user": request.user,
        }),
    ))
}

fn handle_list(service: &IdentityCardService) -> Result<CommandOutput> {
    let mut lines = Vec::new();
    let mut payload = Vec::new();
    for (reference, card) in service.cards() {
        let current = service.current_card_ref() == Some(reference.as_str());
        let indestructible = service.is_indestructible(reference);
        let marker = if current { "*" } else { "-" };
        let network = card.business_network_name().unwrap_or("<admin>");
        lines.push(format!(
            "{marker} {reference} {}@{network} ({}){}",
            card.user_name(),
            card.connection_profile.name,
            if indestructible { " [indestructible]" } else { "" }
        ));
        payload.push(json!({
            "reference": reference,
            "user": card.user_name(),
            "business_network": card.business_network_name(),
            "profile": card.connection_profile.name,
            "roles": card.roles(),
            "current": current,
            "indestructible": indestructible,
        }));
    }

    Ok(CommandOutput::new(
        format!("{} identity cards found", payload.len()),
        json!({
            "command": "list",
            "cards": payload,
        }),
    )
    .with_lines(lines))
}

fn handle_show(
    home: &Path,
    service: &IdentityCardService,
    target: Option<String>,
) -> Result<CommandOutput> {
    let reference = match target {
        Some(target) => resolve_ref(service, &target)?,
        None => service
            .current_card_ref()
            .map(str::to_string)
            .context("no current identity card; specify a card reference")?,
    };
    let card = service
        .identity_card(&reference)
        .context("identity card vanished while loading")?;
    let state = service.card_state(&reference)?;
    let profile_name = card.connection_profile.qualified_name()?;
    let active = ActiveIdentityFile::new(home).load()?;

    Ok(CommandOutput::new(
        format!(
            "Identity card {reference}: {} on {} via {profile_name}",
            card.user_name(),
            card.business_network_name().unwrap_or("<admin>")
        ),
        json!({
            "command": "show",
            "reference": reference,
            "card": {
                "user": card.user_name(),
                "business_network": card.business_network_name(),
                "roles": card.roles(),
                "connection_profile": card.connection_profile,
                "has_enrollment_secret": card.enrollment_secret().is_some(),
                "has_credentials": card.credential_pair().is_some(),
            },
            "qualified_profile_name": profile_name,
            "state": state,
            "active_identity": active,
        }),
    ))
}

async fn handle_use(service: &mut IdentityCardService, target: String) -> Result<CommandOutput> {
    let reference = resolve_ref(service, &target)?;
    service.set_current_identity_card(&reference).await?;
    Ok(CommandOutput::new(
        format!("Current identity card is now {reference}"),
        json!({
            "command": "use",
            "reference": reference,
        }),
    ))
}

async fn handle_activate(
    service: &mut IdentityCardService,
    target: String,
) -> Result<CommandOutput> {
    let reference = resolve_ref(service, &target)?;
    let activated = service.activate_identity_card(&reference).await?.is_some();
    let message = if activated {
        format!("Activated identity card {reference}")
    } else {
        format!("Identity card {reference} was already active")
    };
    Ok(CommandOutput::new(
        message,
        json!({
            "command": "activate",
            "reference": reference,
            "activated": activated,
        }),
    ))
}

async fn handle_export(
    service: &IdentityCardService,
    target: String,
    file: Option<PathBuf>,
) -> Result<CommandOutput> {
    let reference = resolve_ref(service, &target)?;
    let card: IdCard = service.identity_card_for_export(&reference).await?;
    let rendered = serde_json::to_string_pretty(&card)?;

    if let Some(path) = file {
        fs::write(&path, &rendered)
            .with_context(|| format!("failed to write {}", path.display()))?;
        return Ok(CommandOutput::new(
            format!("Exported identity card {reference} to {}", path.display()),
            json!({
                "command": "export",
                "reference": reference,
                "file": path.display().to_string(),
            }),
        ));
    }

    let card_json: Value = serde_json::to_value(&card)?;
    Ok(CommandOutput::new(
        format!("Exported identity card {reference}:\n{rendered}"),
        json!({
            "command": "export",
            "reference": reference,
            "file": null,
            "card": card_json,
        }),
    ))
}

async fn handle_delete(
    ctx: &CommandContext,
    service: &mut IdentityCardService,
    target: String,
    force: bool,
) -> Result<CommandOutput> {
    let reference = resolve_ref(service, &target)?;
    if service.is_indestructible(&reference) && !force {
        bail!("identity card {reference} is indestructible; pass --force to delete it anyway");
    }
    ensure_confirmation(ctx, &format!("Delete identity card {reference}?"))?;
    service.delete_identity_card(&reference).await?;
    Ok(CommandOutput::new(
        format!("Deleted identity card {reference}"),
        json!({
            "command": "delete",
            "deleted": [reference],
        }),
    ))
}

/// Accept a full reference or an unambiguous prefix of one.
fn resolve_ref(service: &IdentityCardService, target: &str) -> Result<String> {
    if service.identity_card(target).is_some() {
        return Ok(target.to_string());
    }
    let matches = service
        .cards()
        .keys()
        .filter(|reference| reference.starts_with(target))
        .cloned()
        .collect::<Vec<_>>();
    match matches.as_slice() {
        [single] => Ok(single.clone()),
        [] => bail!("Identity card does not exist: {target}"),
        _ => bail!("card reference '{target}' is ambiguous"),
    }
}

fn ensure_confirmation(ctx: &CommandContext, prompt: &str) -> Result<()> {
    if ctx.assume_yes {
        return Ok(());
    }
    let confirmed = Confirm::new().with_prompt(prompt).interact()?;
    if confirmed {
        Ok(())
    } else {
        bail!("operation aborted by user")
    }
}

fn read_profile(path: &Path) -> Result<ConnectionProfile> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&data)
        .with_context(|| format!("failed to parse connection profile {}", path.display()))
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}
