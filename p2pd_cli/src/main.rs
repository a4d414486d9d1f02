use clap::Parser;
use p2pd_cli::commands::execute;
use p2pd_cli::config::Config;

#[tokio::main]
async fn main() {
    env_logger::init();
    let config: Config = Config::parse();
    let (global_options, command) = config.to_parts();

    if let Err(err) = execute(command, global_options).await {
        eprintln!("** Error ** \n {err:#}");
        std::process::exit(1);
    }
}
