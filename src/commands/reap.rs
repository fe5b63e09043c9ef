//! Reap command implementation

use crate::config::Config;
use crate::error::Result;
use crate::sync::Reaper;
use crate::tasks::TaskDb;

/// Run one reaper sweep; returns how many tasks were marked timed out
pub async fn cmd_reap(config: &Config, db: &TaskDb) -> Result<usize> {
    let reaper = Reaper::new(db.clone(), &config.sync);
    reaper.run_once().await
}

/// Run the reaper on its configured interval until the process is stopped
pub async fn cmd_reap_watch(config: &Config, db: &TaskDb) -> Result<()> {
    println!(
        "Watching for stuck tasks every {}s (timeout {}s). Ctrl-C to stop.",
        config.sync.reaper_interval_secs, config.sync.timeout_secs
    );
    let reaper = Reaper::new(db.clone(), &config.sync);
    reaper.run().await;
    Ok(())
}

/// Print a sweep result to console
pub fn print_reap_result(reaped: usize) {
    if reaped == 0 {
        println!("No stuck tasks.");
    } else {
        println!("Marked {} task(s) as timed out.", reaped);
    }
}
