use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use log::{debug, info};
use tokio::time::Instant;

use tagscript::cli::{self, ConfigFile};
use tagscript::{Config, Engine, Scheduler};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("tagscript: {e}");
            eprintln!("{}", cli::USAGE);
            std::process::exit(2);
        }
    };

    // ── Configuration: defaults, then the rc file, then flags ────────────────
    let mut config = Config::new();
    let rc = match &args.config {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(path) => Some(path.clone()),
        ConfigFile::Search => cli::find_user_config(),
    };
    if let Some(path) = rc {
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                let (loaded, errors) = Config::load_str(&text);
                for e in errors {
                    eprintln!("tagscript: {}: {e}", path.display());
                }
                debug!("loaded {}", path.display());
                config = loaded;
            }
            Err(e) => eprintln!("tagscript: warning: {}: {e}", path.display()),
        }
    }
    args.apply(&mut config);
    info!("config: {config:?}");

    // ── Load scripts ─────────────────────────────────────────────────────────
    let engine = Rc::new(Engine::new(config.engine.clone()));
    let mut names = Vec::new();
    for path in &args.scripts {
        match load_script(&engine, path).await {
            Ok(name) => names.push(name),
            Err(e) => {
                eprintln!("tagscript: {e}");
                std::process::exit(1);
            }
        }
    }

    // The first script runs; the rest are there for `run` and `call`.
    let mut sched = Scheduler::new(Rc::clone(&engine));
    if let Some(main) = names.first() {
        sched.create_queue_named(main);
    }

    // ── Tick loop ────────────────────────────────────────────────────────────
    let mut interval = tokio::time::interval(Duration::from_millis(config.tick_ms));
    let mut last = Instant::now();
    while sched.has_live() {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                sched.stop_all();
                print_output(&mut sched);
                eprintln!("tagscript: interrupted");
                std::process::exit(130);
            }
        }
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f64();
        last = now;
        sched.advance_all(dt);
        print_output(&mut sched);
    }
}

/// Read and register a script file under its file stem.
async fn load_script(engine: &Engine, path: &Path) -> Result<String, tagscript::Error> {
    let src = tokio::fs::read_to_string(path).await?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    engine.load(&name, &src)?;
    Ok(name)
}

fn print_output(sched: &mut Scheduler) {
    for (_, line) in sched.drain_all_output() {
        println!("{line}");
    }
    sched.clear_retired();
}
