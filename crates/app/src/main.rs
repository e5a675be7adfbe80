//! `gamma` -- command-line client for the Gamma video service.
//!
//! Logs in, uploads videos with a progress display, lists uploads,
//! watches live processing events and plays ready assets through an
//! external player. Configuration comes from the environment (see
//! [`ClientConfig::from_env`]); a `.env` file is honoured.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use gamma_app::{
    AssetDetailController, ClientConfig, PlayerView, UploadOrchestrationController,
};
use gamma_assets::{
    AssetDetailFetch, AssetStatusStore, HlsEngineFactory, PlaybackSessionManager,
    PlayerProcessSurface, UploadListFetch,
};
use gamma_client::{AuthSession, GammaApi, UploadClient, UploadFile};
use gamma_core::UploadRecord;
use gamma_live::{LiveEvent, LiveStatusChannel};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gamma", version, about = "Upload, track and play Gamma videos")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the configured credentials against the server.
    Login,
    /// End the server session.
    Logout,
    /// List uploads and their status.
    List,
    /// Upload a video file.
    Upload {
        /// Path of the video to upload.
        path: PathBuf,
    },
    /// Print live processing events and upload status changes until Ctrl-C.
    Watch,
    /// Play an asset once it is ready.
    Play {
        /// Asset id.
        asset_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gamma=info,gamma_app=info,gamma_live=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env().context("invalid configuration")?;

    tracing::info!(api_url = %config.api_url, ws_url = %config.ws_url, "Starting gamma");

    let api = Arc::new(
        GammaApi::new(config.api_url.clone(), config.request_timeout)
            .context("failed to build HTTP client")?,
    );
    let auth = AuthSession::new(Arc::clone(&api));

    match cli.command {
        Command::Login => {
            let Some(message) = login(&auth, &config).await? else {
                bail!("GAMMA_USERNAME and GAMMA_PASSWORD must be set");
            };
            println!("{message}");
        }
        Command::Logout => {
            login(&auth, &config).await?;
            let outcome = auth.logout().await;
            if outcome.server_acknowledged {
                println!("{}", outcome.message);
            } else {
                println!("Logged out locally (server said: {})", outcome.message);
            }
        }
        Command::List => {
            login(&auth, &config).await?;
            let uploads = api.list_uploads().await.context("failed to list uploads")?;
            print_uploads(&uploads);
        }
        Command::Upload { path } => {
            login(&auth, &config).await?;
            upload(&api, &config, &path).await?;
        }
        Command::Watch => {
            login(&auth, &config).await?;
            watch(&api, &config).await?;
        }
        Command::Play { asset_id } => {
            login(&auth, &config).await?;
            play(&api, &config, &asset_id).await?;
        }
    }

    Ok(())
}

/// Log in when credentials are configured; otherwise requests go out
/// without a session cookie.
async fn login(auth: &AuthSession, config: &ClientConfig) -> anyhow::Result<Option<String>> {
    let Some(credentials) = &config.credentials else {
        tracing::debug!("No credentials configured, skipping login");
        return Ok(None);
    };
    let message = auth.login(credentials).await.context("login failed")?;
    Ok(Some(message))
}

fn print_uploads(uploads: &[UploadRecord]) {
    if uploads.is_empty() {
        println!("No uploads yet.");
        return;
    }
    for upload in uploads {
        println!("{:<10} {:<11} {}", upload.short_id(), upload.status, upload.title);
    }
}

async fn upload(api: &Arc<GammaApi>, config: &ClientConfig, path: &Path) -> anyhow::Result<()> {
    let file = UploadFile::from_path(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let live = LiveStatusChannel::websocket(config.ws_url.clone(), config.reconnect.clone());
    let store = Arc::new(AssetStatusStore::spawn(UploadListFetch::new(Arc::clone(api))));
    let controller =
        UploadOrchestrationController::new(UploadClient::new(api.clone()), store, &live);

    let mut state = controller.state();
    controller.handle_file(file)?;

    let mut last_percent = None;
    loop {
        let current = state.borrow_and_update().clone();
        if last_percent != Some(current.progress_percent) {
            println!("{:>3}%", current.progress_percent);
            last_percent = Some(current.progress_percent);
        }
        if !current.uploading {
            if let Some(error) = current.last_error {
                bail!("upload failed: {error}");
            }
            if let Some(receipt) = current.last_completed {
                println!("Uploaded {} as {}", receipt.title, receipt.id);
            }
            break;
        }
        if state.changed().await.is_err() {
            break;
        }
    }

    live.shutdown().await;
    Ok(())
}

async fn watch(api: &Arc<GammaApi>, config: &ClientConfig) -> anyhow::Result<()> {
    let live = LiveStatusChannel::websocket(config.ws_url.clone(), config.reconnect.clone());
    let store = Arc::new(AssetStatusStore::spawn(UploadListFetch::new(Arc::clone(api))));
    // The controller's monitor logs every status change of the list.
    let _controller =
        UploadOrchestrationController::new(UploadClient::new(api.clone()), store, &live);

    let _printer = live.subscribe(|event| match event {
        LiveEvent::AssetProcessed(data) => println!(
            "asset processed: upload={} asset={} status={}",
            data.upload_id.as_deref().unwrap_or("-"),
            data.asset_id.as_deref().unwrap_or("-"),
            data.status.as_deref().unwrap_or("-"),
        ),
        LiveEvent::Unknown { kind, .. } => println!("event: {kind}"),
    });

    println!("Watching {} (Ctrl-C to stop)", config.ws_url);
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    live.shutdown().await;
    Ok(())
}

async fn play(api: &Arc<GammaApi>, config: &ClientConfig, asset_id: &str) -> anyhow::Result<()> {
    let live = LiveStatusChannel::websocket(config.ws_url.clone(), config.reconnect.clone());
    let store = Arc::new(AssetStatusStore::spawn(AssetDetailFetch::new(
        Arc::clone(api),
        asset_id,
    )));
    let _following = store.follow(&live);

    let manager = Arc::new(PlaybackSessionManager::new(
        api.clone(),
        Arc::new(HlsEngineFactory::new(config.software_engine, config.max_bandwidth)),
    ));
    let surface = Arc::new(PlayerProcessSurface::new(config.player.clone()));
    let detail = AssetDetailController::open(store, manager, surface.clone());

    let mut view = detail.view();
    loop {
        let current = view.borrow_and_update().clone();
        match current {
            PlayerView::Loading => {}
            PlayerView::Unavailable(status) => {
                println!("Asset {asset_id} is {status}; waiting until it is ready (Ctrl-C to stop)")
            }
            PlayerView::Playing(strategy) => {
                println!("Playing {asset_id} ({strategy})");
                break;
            }
            PlayerView::Error(error) => {
                detail.close();
                live.shutdown().await;
                bail!("cannot play {asset_id}: {error}");
            }
        }

        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                detail.close();
                live.shutdown().await;
                return Ok(());
            }
        }
    }

    // The software engine binds the player asynchronously.
    while !surface.is_playing() {
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tokio::select! {
        result = surface.wait() => {
            result.context("player failed")?;
        }
        _ = tokio::signal::ctrl_c() => {}
    }

    detail.close();
    live.shutdown().await;
    Ok(())
}
