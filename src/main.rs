use clap::Parser;
use webblast_tools::cli;
use webblast_tools::commands;
use webblast_tools::commands::search::SearchOptions;

fn main() {
    let args = cli::Args::parse();

    let result = match args.command {
        cli::Commands::Search {
            fasta_file,
            output_dir,
            start,
            max,
            concurrency,
            stagger,
            timeout_hours,
            test,
            fresh,
            config,
        } => commands::search::run(SearchOptions {
            fasta: fasta_file,
            output_dir,
            start,
            max,
            concurrency,
            stagger_secs: stagger,
            timeout_hours,
            test,
            fresh,
            config,
        }),
        cli::Commands::Download { output, term, retmax } => commands::download::run(output, term, retmax),
        cli::Commands::InitConfig { path, force } => commands::init_config::run(path, force),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
