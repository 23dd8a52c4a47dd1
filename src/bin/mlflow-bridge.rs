use mlflow_bridge::cli;

fn main() {
    if let Err(e) = cli::cli_main() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
