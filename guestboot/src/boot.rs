//! Top-level orchestration.

use crate::errors::BootResult;
use crate::layout::AssetLayout;
use crate::lifecycle::{Controller, watch_interrupt};
use crate::options::BootOptions;
use crate::provision::{AssetFetcher, HttpFetcher, ProvisionContext, provision};
use crate::terminal::{ConsoleAttachment, HostTerminal, TerminalModes, TerminalSession};
use crate::vmm::vfkit::VfkitHypervisor;
use crate::vmm::{Hypervisor, VmConfigSpec};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Collaborators a boot run is assembled from.
pub struct BootEnv<M: TerminalModes> {
    pub fetcher: Arc<dyn AssetFetcher>,
    pub hypervisor: Box<dyn Hypervisor>,
    pub open_terminal: Box<dyn FnOnce() -> BootResult<TerminalSession<M>> + Send>,
}

/// Provision (with `--setup`), then boot the guest on vfkit with the
/// process's terminal as its console.
///
/// Returns after the guest has stopped, the user interrupted, or `cancel`
/// fired and the stop request went through.
pub async fn boot(options: BootOptions, cancel: CancellationToken) -> BootResult<()> {
    let env = BootEnv {
        fetcher: Arc::new(HttpFetcher::new()?),
        hypervisor: Box::new(VfkitHypervisor::new()?),
        open_terminal: Box::new(TerminalSession::<HostTerminal>::open),
    };
    boot_with(options, cancel, env).await
}

/// [`boot`] with explicit collaborators.
pub async fn boot_with<M: TerminalModes>(
    options: BootOptions,
    cancel: CancellationToken,
    env: BootEnv<M>,
) -> BootResult<()> {
    options.sanitize()?;
    let layout = AssetLayout::new(&options.workdir);

    if options.setup {
        tracing::info!(workdir = %layout.workdir().display(), "Provisioning boot assets");
        provision(ProvisionContext {
            layout: layout.clone(),
            fetcher: env.fetcher,
            cancel: cancel.child_token(),
            disk_size_mib: options.disk_size_mib,
        })
        .await?;
    } else {
        layout.ensure_assets_present()?;
    }

    let session = (env.open_terminal)()?;
    let console: ConsoleAttachment = session.attach()?;
    let config = VmConfigSpec::from_options(&options, &layout, console);

    let interrupt = CancellationToken::new();
    let watcher = watch_interrupt(interrupt.clone());

    let result = Controller::new(env.hypervisor)
        .run(&config, cancel, interrupt.clone())
        .await;

    // Stop the watcher without treating it as an interrupt.
    watcher.abort();
    drop(config);
    let closed = session.close();

    result?;
    closed
}
