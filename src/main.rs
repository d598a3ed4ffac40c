use kestrel_lua::cli::RunnerArgs;
use kestrel_lua::runner;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = match RunnerArgs::parse_from_env() {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("[cli] {err}");
            std::process::exit(2);
        }
    };
    match runner::run(&args) {
        Ok(report) => {
            for event in report.events.iter().filter(|event| !event.is_message()) {
                println!("{event}");
            }
            if !report.initialized || !report.errors.is_empty() {
                eprintln!("[kestrel_lua] {} error(s) while running {}", report.errors.len(), args.script.display());
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("Application error: {err:?}");
            std::process::exit(1);
        }
    }
}
