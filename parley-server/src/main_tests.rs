//! Tests for the command line surface.

use crate::{Cli, Commands};
use clap::{CommandFactory, Parser};
use std::path::PathBuf;

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn serve_parses_port_and_config() {
    let cli = Cli::try_parse_from(["parley", "serve", "--port", "9000", "--config", "parley.yaml"])
        .unwrap();

    match cli.command {
        Commands::Serve { port, config } => {
            assert_eq!(port, 9000);
            assert_eq!(config, Some(PathBuf::from("parley.yaml")));
        }
    }
}

#[test]
fn serve_accepts_short_flags_without_config() {
    let cli = Cli::try_parse_from(["parley", "serve", "-p", "8081"]).unwrap();
    let Commands::Serve { port, config } = cli.command;
    assert_eq!(port, 8081);
    assert!(config.is_none());
}

#[test]
fn serve_requires_a_port() {
    assert!(Cli::try_parse_from(["parley", "serve"]).is_err());
    assert!(Cli::try_parse_from(["parley", "serve", "--port", "not-a-port"]).is_err());
}

#[test]
fn unknown_subcommand_is_rejected() {
    assert!(Cli::try_parse_from(["parley", "invalid-command"]).is_err());
}

#[tokio::test]
async fn serve_reports_invalid_configuration() {
    let err = crate::handle_serve_command(8080, Some(PathBuf::from("parley.ini")))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("parley.ini"));
}
