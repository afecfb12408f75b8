use clap::Parser;

fn main() {
    let cli = hopper_core::cli::Cli::parse();
    if let Err(error) = hopper_core::cli::run(cli) {
        eprintln!("[hopper-core] {error}");
        std::process::exit(1);
    }
}
