use std::thread;
use std::time::Duration;

use daemon_kit::{Config, Daemon, LevelFilter, Service};

struct Ticker;

impl Service for Ticker {
    fn run(&self) {
        let mut i = 0u64;
        loop {
            // Captured by the daemon's stdout redirector, lands in syslog
            // at INFO.
            println!("tick #{}", i);
            i += 1;
            thread::sleep(Duration::from_secs(3));
        }
    }

    fn on_terminate(&self) {
        // Runs on SIGTERM, before the pidfile is removed and the process
        // exits. Real services close connections and flush state here.
        println!("ticker shutting down");
    }

    fn on_reload(&self) {
        // Runs on SIGHUP; the daemon keeps ticking.
        println!("reload requested, nothing to reload");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let pid_path = std::env::temp_dir().join("tick-daemon.pid");

    println!("Launching the tick daemon, pidfile at {:?}", pid_path);
    println!("Follow it with: journalctl -t tick-daemon  (or tail your syslog)");
    println!("Stop it with:   kill $(cat {:?})", pid_path);

    let daemon = Daemon::with_config(
        "tick-daemon",
        &pid_path,
        Config {
            debug: false,
            log_level: Some(LevelFilter::Info),
        },
    )?;

    daemon.start(Ticker)?;
    Ok(())
}
