use std::path::PathBuf;

use clap::{Parser, Subcommand};
use jailftpd::config::Config;
use jailftpd::control;
use jailftpd::server::Server;

/// A jailed FTP/FTPS server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the server using the given configuration file.
    Serve {
        config_path: PathBuf,
    },
    /// Prompt twice for a password and print its adaptive salted hash.
    Genpass,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Serve { config_path } => serve(&config_path).await,
        Command::Genpass => genpass(),
    };

    if let Err(err) = result {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn serve(config_path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(config_path)?;

    let tls_acceptor = match (&config.tls_cert, &config.tls_key) {
        (Some(cert_path), Some(key_path)) => Some(load_tls_acceptor(cert_path, key_path)?),
        _ => None,
    };

    let server = Server::new(config, tls_acceptor);
    server.listen().await?;
    Ok(())
}

fn load_tls_acceptor(
    cert_path: &std::path::Path,
    key_path: &std::path::Path,
) -> Result<tokio_rustls::TlsAcceptor, Box<dyn std::error::Error>> {
    let cert_bytes = std::fs::read(cert_path)?;
    let key_bytes = std::fs::read(key_path)?;

    let cert_chain = rustls_pemfile::certs(&mut cert_bytes.as_slice())
        .collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut key_bytes.as_slice())?
        .ok_or("no private key found in tls_key file")?;

    let acceptor = control::build_acceptor(cert_chain, key)?;
    Ok(acceptor)
}

fn genpass() -> Result<(), Box<dyn std::error::Error>> {
    let first = rpassword::prompt_password("Password: ")?;
    let second = rpassword::prompt_password("Confirm password: ")?;
    if first != second {
        eprintln!("passwords did not match");
        std::process::exit(1);
    }
    let hash = jailftpd::auth::hash(&first)?;
    println!("{hash}");
    Ok(())
}
