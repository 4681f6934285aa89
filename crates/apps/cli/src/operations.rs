use crate::reporting::{ConsoleArchiveObserver, ConsoleAuthObserver, ConsoleSyncObserver};
use app_state::AppSettings;
use color_eyre::Result;
use common_types::RemoteLibrary;
use icloud::{AuthSession, PhotosClient};
use photo_library::{LibraryLock, LocalLibrary};
use std::path::PathBuf;
use std::sync::Arc;
use sync_engine::{SyncEngine, SyncError, SyncOptions, run_archive, run_daemon};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug)]
pub enum Operation {
    Token,
    Sync,
    Archive { path: PathBuf },
    Daemon,
}

/// Run one operation against the library.
///
/// The prelude is shared by every variant: open the library, take the
/// process-singleton lock, install signal handling, and authenticate. The
/// lock is released on every exit path, signal included, because the guard
/// releases on drop.
pub async fn run(operation: Operation, settings: AppSettings) -> Result<()> {
    let library = Arc::new(LocalLibrary::open(&settings.library.data_dir)?);
    let lock = LibraryLock::acquire(library.layout(), settings.library.force)?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let mut session = AuthSession::new(
        settings.secrets.username.clone(),
        settings.secrets.password.clone(),
        settings.secrets.trust_token.clone(),
        library.layout().trust_token_file(),
        settings.mfa.port,
        Arc::new(ConsoleAuthObserver),
    );
    session.authenticate(&cancel).await?;
    let client = Arc::new(PhotosClient::new(session, cancel.clone()));

    let engine = SyncEngine::new(
        client.clone(),
        library.clone(),
        Arc::new(ConsoleSyncObserver),
        SyncOptions {
            max_retries: settings.sync.max_retries,
            download_threads: settings.sync.download_threads,
            ..SyncOptions::default()
        },
    );

    let result: Result<(), SyncError> = match operation {
        Operation::Token => {
            match client.trust_token().await {
                Some(token) => println!("{token}"),
                None => warn!("Sign-in completed but no trust token was issued"),
            }
            Ok(())
        }
        Operation::Sync => engine.run(&cancel).await,
        Operation::Archive { path } => {
            let remote_snapshot = client.fetch_all().await.map_err(SyncError::Remote)?;
            run_archive(
                &library,
                client.as_ref(),
                &remote_snapshot,
                &path,
                settings.sync.remote_delete,
                &ConsoleArchiveObserver,
            )
            .await
        }
        Operation::Daemon => match settings.sync.schedule.as_deref() {
            Some(schedule) => run_daemon(&engine, schedule, &cancel).await,
            None => Err(SyncError::MissingSchedule),
        },
    };

    lock.release()?;
    result?;
    Ok(())
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
        info!("Shutdown signal received, unwinding");
        cancel.cancel();
    });
}
