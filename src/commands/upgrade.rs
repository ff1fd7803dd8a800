// ABOUTME: Upgrade command implementation.
// ABOUTME: Builds session options from flags and settings, runs the session, prints results.

use super::runtime_connection::connect_to_runtime;
use crate::cli::Cli;
use nonempty::NonEmpty;
use reimage::config::Settings;
use reimage::error::{Error, Result};
use reimage::guest::GuestScript;
use reimage::output::Output;
use reimage::runtime::RuntimeConfig;
use reimage::upgrade::{Interrupt, ProxyMode, ResolveOptions, Session, SessionOptions};

/// Upgrade every image named on the command line.
pub async fn upgrade(cli: Cli, output: &mut Output) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;

    let script = match cli.script.as_ref().or(settings.script.as_ref()) {
        Some(path) => GuestScript::load(path)?,
        None => GuestScript::bundled(),
    };
    tracing::debug!(script = %script.origin(), "upgrade script");

    let proxy = ProxyMode::from_flags(cli.http_proxy, cli.squid)?;
    let references = NonEmpty::from_vec(cli.images)
        .ok_or_else(|| Error::InvalidConfig("no images given".to_string()))?;

    let runtime = connect_to_runtime(
        &settings,
        RuntimeConfig {
            runtime: cli.runtime,
            socket: cli.socket,
        },
        output,
    )
    .await?;

    let options = SessionOptions {
        force: cli.force,
        resolve: ResolveOptions {
            ignore_unknown: cli.ignore_unknown,
            ignore_inspect_errors: cli.ignore_inspect_errors,
        },
        proxy,
        https_proxy: cli.https_proxy,
        stop_affected: cli.stop,
        stop_timeout: settings.stop_timeout,
        status_dir: settings.status_dir.clone(),
        sidecar: settings.proxy.clone(),
    };

    output.start_timer();
    let interrupt = Interrupt::on_ctrl_c();
    let report = {
        let out = &*output;
        Session::new(&runtime, &script, options, interrupt)
            .run(&references, |outcome| out.outcome(outcome))
            .await?
    };
    output.summary(&report);

    let failed = report.failures();
    if cli.fail_on_error && failed > 0 {
        return Err(Error::UpgradesFailed(failed));
    }
    Ok(())
}
