//! Command-line argument parsing for storewatch

/// Parsed command line flags
#[derive(Debug, Default, PartialEq)]
pub struct Args {
    pub once: bool,
    pub validate: bool,
    pub help: bool,
    /// `--output PATH`, overrides REPORT_OUTPUT
    pub output: Option<String>,
}

pub fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from(&args)
}

/// Parse an argv-style slice; the first element is the program name
pub fn parse_args_from(args: &[String]) -> Args {
    let mut result = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--once" => result.once = true,
            "--validate" => result.validate = true,
            "--help" | "-h" => result.help = true,
            "--output" => {
                if i + 1 < args.len() && !args[i + 1].starts_with("--") {
                    i += 1;
                    result.output = Some(args[i].clone());
                } else {
                    result.output = Some("report.csv".to_string());
                }
            }
            _ => {}
        }
        i += 1;
    }

    result
}

pub fn print_help() {
    println!("storewatch - Store uptime report service\n");
    println!("USAGE:");
    println!("    storewatch [OPTIONS]\n");
    println!("OPTIONS:");
    println!("    --once                  Generate one report, write the CSV and exit");
    println!("    --output [PATH]         CSV path for --once (default: REPORT_OUTPUT or report.csv)");
    println!("    --validate              Validate configuration and exit");
    println!("    --help, -h              Show this help message\n");
    println!("ENVIRONMENT:");
    println!("    DATA_DIR                Directory with the input CSV files (default: ./data/input)");
    println!("    HTTP_PORT               HTTP API port (default: 8000)");
    println!("    REPORT_OUTPUT           Default CSV path for --once (default: report.csv)");
}
