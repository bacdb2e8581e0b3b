use std::path::PathBuf;

use clap::Parser;

/// Submit URLs appended to watched files for analysis and collect the
/// resulting reports, screenshots and domain graphs.
#[derive(Parser, Debug)]
#[command(name = "uqw", version, about)]
pub struct CliArgs {
    /// Path to the YAML config file.
    #[arg(long, env = "UQW_CONFIG")]
    pub config: PathBuf,

    /// Shutdown timeout in seconds (overrides `shutdown_timeout_secs`).
    #[arg(long, env = "UQW_SHUTDOWN_TIMEOUT")]
    pub shutdown_timeout: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_flag_is_required() {
        std::env::remove_var("UQW_CONFIG");
        assert!(CliArgs::try_parse_from(["uqw"]).is_err());
    }

    #[test]
    fn parses_flags() {
        let args = CliArgs::try_parse_from(["uqw", "--config", "uqw.yaml", "--shutdown-timeout", "5"]).unwrap();
        assert_eq!(args.config, PathBuf::from("uqw.yaml"));
        assert_eq!(args.shutdown_timeout, Some(5));
    }
}
