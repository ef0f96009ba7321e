//! The per-connection session state machine and command dispatcher. This
//! is the core of the server: it owns the session's mutable state and
//! drives the command loop and its handlers.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio_rustls::TlsAcceptor;

use crate::commands::{self, FtpCommand};
use crate::config::Config;
use crate::control::{self, BoxedControl};
use crate::data::DataChannel;
use crate::listing::{self, OwnerLookup};
use crate::resolver;
use crate::response;

/// Control lines longer than this are a syntax error.
const MAX_LINE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Ascii,
    Image,
}

impl Default for DataType {
    fn default() -> Self {
        DataType::Image
    }
}

enum ReadOutcome {
    Line(String),
    TooLong,
    Eof,
}

/// Reads one CRLF-terminated line, bounded to `max` bytes. A line that
/// exceeds the bound is reported as `TooLong`; its remainder (up to the
/// next CRLF) is discarded before returning.
async fn read_line_bounded<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    max: usize,
) -> std::io::Result<ReadOutcome> {
    let mut buf: Vec<u8> = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(ReadOutcome::Eof);
        }
        if let Some(pos) = available.iter().position(|&b| b == b'\n') {
            let take = pos + 1;
            buf.extend_from_slice(&available[..take]);
            reader.consume(take);
            if buf.len() > max {
                return Ok(ReadOutcome::TooLong);
            }
            let line = String::from_utf8_lossy(&buf)
                .trim_end_matches(['\r', '\n'])
                .to_string();
            return Ok(ReadOutcome::Line(line));
        }
        let len = available.len();
        buf.extend_from_slice(available);
        reader.consume(len);
        if buf.len() > max {
            discard_until_newline(reader).await?;
            return Ok(ReadOutcome::TooLong);
        }
    }
}

async fn discard_until_newline<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<()> {
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        if let Some(pos) = available.iter().position(|&b| b == b'\n') {
            reader.consume(pos + 1);
            return Ok(());
        }
        let len = available.len();
        reader.consume(len);
    }
}

/// One accepted control connection. Owns the control stream, the
/// session's working directory and login state, and the data channel,
/// and is responsible for keeping every resolved path confined to the
/// jail for as long as it lives.
pub struct Session {
    control: Option<BufStream<BoxedControl>>,
    config: Arc<Config>,
    peer_addr: SocketAddr,
    jail_dir: PathBuf,
    work_dir: PathBuf,
    logged_in: bool,
    quitting: bool,
    data_type: DataType,
    passive: Option<bool>,
    data: DataChannel,
    rename_from: Option<PathBuf>,
    tls: bool,
    tls_acceptor: Option<Arc<TlsAcceptor>>,
    owner_lookup: OwnerLookup,
}

impl Session {
    pub fn new(
        control: BoxedControl,
        config: Arc<Config>,
        peer_addr: SocketAddr,
        tls_acceptor: Option<Arc<TlsAcceptor>>,
        already_tls: bool,
    ) -> std::io::Result<Self> {
        let jail_dir = config.jail.canonicalize()?;
        Ok(Self {
            control: Some(BufStream::new(control)),
            config,
            peer_addr,
            work_dir: jail_dir.clone(),
            jail_dir,
            logged_in: false,
            quitting: false,
            data_type: DataType::default(),
            passive: None,
            data: DataChannel::new(),
            rename_from: None,
            tls: already_tls,
            tls_acceptor,
            owner_lookup: listing::default_owner_lookup,
        })
    }

    /// Overrides the user/group lookup used to render LIST entries
    /// (tests inject [`listing::unknown_owner`] for determinism).
    pub fn with_owner_lookup(mut self, lookup: OwnerLookup) -> Self {
        self.owner_lookup = lookup;
        self
    }

    async fn write_control(&mut self, text: &str) -> std::io::Result<()> {
        let stream = self
            .control
            .as_mut()
            .expect("control stream missing outside of AUTH TLS upgrade");
        stream.write_all(text.as_bytes()).await?;
        stream.flush().await
    }

    /// Runs the session to completion: greeting, command loop, then
    /// returns once the peer disconnects, sends QUIT, or a control-channel
    /// I/O error occurs.
    pub async fn run(mut self) -> std::io::Result<()> {
        self.write_control(response::READY).await?;
        loop {
            let outcome = {
                let stream = self.control.as_mut().expect("control stream missing");
                read_line_bounded(stream, MAX_LINE).await?
            };
            match outcome {
                ReadOutcome::Eof => break,
                ReadOutcome::TooLong => {
                    self.write_control(response::SYNTAX_ERROR).await?;
                }
                ReadOutcome::Line(line) => {
                    let cmd = commands::parse_command(&line);
                    tracing::debug!(peer = %self.peer_addr, command = ?cmd, "dispatch");
                    self.dispatch(cmd).await?;
                    if self.quitting {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, cmd: FtpCommand) -> std::io::Result<()> {
        match cmd {
            FtpCommand::User(name) => self.handle_user(name).await,
            FtpCommand::Pass(pass) => self.handle_pass(pass).await,
            FtpCommand::Quit => self.handle_quit().await,
            FtpCommand::Rein => self.handle_rein().await,
            FtpCommand::Noop => self.write_control(response::COMMAND_OK).await,
            FtpCommand::Acct | FtpCommand::Allo | FtpCommand::Site => {
                self.write_control(response::SUPERFLUOUS).await
            }
            FtpCommand::Unknown(_) => self.write_control(response::NOT_IMPLEMENTED).await,
            FtpCommand::Feat => self.write_control(response::FEAT_BODY).await,
            FtpCommand::Help => self.write_control(response::HELP_BODY).await,
            FtpCommand::Auth(mechanism) => self.handle_auth(mechanism).await,
            FtpCommand::Pbsz(_) => self.write_control(response::COMMAND_OK).await,
            FtpCommand::Prot(level) => self.handle_prot(level).await,
            other => {
                if !self.logged_in {
                    return self.write_control(response::NOT_LOGGED_IN).await;
                }
                self.dispatch_authenticated(other).await
            }
        }
    }

    async fn dispatch_authenticated(&mut self, cmd: FtpCommand) -> std::io::Result<()> {
        match cmd {
            FtpCommand::Type(arg) => self.handle_type(arg).await,
            FtpCommand::Mode(arg) => self.handle_mode(arg).await,
            FtpCommand::Stru(arg) => self.handle_stru(arg).await,
            FtpCommand::Port(arg) => self.handle_port(arg).await,
            FtpCommand::Pasv => self.handle_pasv().await,
            FtpCommand::Pwd => self.handle_pwd().await,
            FtpCommand::Cwd(arg) => self.handle_cwd(arg).await,
            FtpCommand::Cdup => self.handle_cdup().await,
            FtpCommand::Mkd(arg) => self.handle_mkd(arg).await,
            FtpCommand::Rmd(arg) => self.handle_rmd(arg).await,
            FtpCommand::Dele(arg) => self.handle_dele(arg).await,
            FtpCommand::List(arg) => self.handle_list(arg).await,
            FtpCommand::Nlst(arg) => self.handle_nlst(arg).await,
            FtpCommand::Rnfr(arg) => self.handle_rnfr(arg).await,
            FtpCommand::Rnto(arg) => self.handle_rnto(arg).await,
            FtpCommand::Retr(arg) => self.handle_retr(arg).await,
            FtpCommand::Stor(arg) => self.handle_stor(arg, false).await,
            FtpCommand::Appe(arg) => self.handle_stor(arg, true).await,
            FtpCommand::Syst => self.write_control(response::SYST_INFO).await,
            FtpCommand::Mdtm(arg) => self.handle_mdtm(arg).await,
            FtpCommand::Size(arg) => self.handle_size(arg).await,
            FtpCommand::Abor => self.write_control(response::ABOR_NO_TRANSFER).await,
            // USER/PASS/QUIT/REIN/NOOP/ACCT/ALLO/SITE/unknown/FEAT/HELP/AUTH/PBSZ/PROT
            // are all handled above `dispatch_authenticated` and never reach here.
            _ => unreachable!("pre-auth-eligible command routed into authenticated dispatch"),
        }
    }

    // --- authentication state machine ---

    async fn handle_user(&mut self, name: String) -> std::io::Result<()> {
        self.logged_in = false;
        if !self.config.allow_any_user() && name != self.config.login {
            return self.write_control(response::NOT_LOGGED_IN).await;
        }
        if self.config.password_required() {
            return self.write_control(response::NEED_PASSWORD).await;
        }
        self.logged_in = true;
        self.write_control(response::LOGGED_IN).await
    }

    async fn handle_pass(&mut self, candidate: String) -> std::io::Result<()> {
        self.logged_in = false;
        if !crate::auth::verify(&self.config.password_hash, &candidate) {
            return self.write_control(response::NOT_LOGGED_IN).await;
        }
        self.logged_in = true;
        self.write_control(response::LOGGED_IN).await
    }

    async fn handle_quit(&mut self) -> std::io::Result<()> {
        self.quitting = true;
        self.logged_in = false;
        self.write_control(response::GOODBYE).await
    }

    async fn handle_rein(&mut self) -> std::io::Result<()> {
        self.logged_in = false;
        self.work_dir = self.jail_dir.clone();
        self.write_control(response::REIN_READY).await
    }

    async fn handle_auth(&mut self, mechanism: String) -> std::io::Result<()> {
        let Some(acceptor) = self.tls_acceptor.clone() else {
            return self.write_control(response::NOT_IMPLEMENTED).await;
        };
        if !mechanism.eq_ignore_ascii_case("TLS") {
            return self.write_control(response::PARAMETER_NOT_IMPLEMENTED).await;
        }
        if self.tls {
            return self.write_control(&response::already_secured()).await;
        }
        self.write_control(&response::auth_tls_ok()).await?;

        let stream = self.control.take().expect("control stream missing");
        let boxed = stream.into_inner();
        match control::upgrade(&acceptor, boxed).await {
            Ok(upgraded) => {
                self.control = Some(BufStream::new(upgraded));
                self.tls = true;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(peer = %self.peer_addr, error = %err, "AUTH TLS handshake failed");
                self.quitting = true;
                Ok(())
            }
        }
    }

    async fn handle_prot(&mut self, level: String) -> std::io::Result<()> {
        match level.as_str() {
            "P" => self.write_control(response::COMMAND_OK).await,
            _ => self.write_control(response::PARAMETER_NOT_IMPLEMENTED).await,
        }
    }

    // --- transfer parameters ---

    async fn handle_type(&mut self, arg: String) -> std::io::Result<()> {
        let mut parts = arg.split_whitespace();
        let data_type = parts.next().unwrap_or("");
        if let Some(format_control) = parts.next() {
            if format_control != "N" {
                return self.write_control(response::PARAMETER_NOT_IMPLEMENTED).await;
            }
        }
        match data_type {
            "A" => {
                self.data_type = DataType::Ascii;
                self.write_control(response::COMMAND_OK).await
            }
            "I" => {
                self.data_type = DataType::Image;
                self.write_control(response::COMMAND_OK).await
            }
            _ => self.write_control(response::PARAMETER_NOT_IMPLEMENTED).await,
        }
    }

    async fn handle_mode(&mut self, arg: String) -> std::io::Result<()> {
        if arg == "S" {
            self.write_control(response::COMMAND_OK).await
        } else {
            self.write_control(response::PARAMETER_NOT_IMPLEMENTED).await
        }
    }

    async fn handle_stru(&mut self, arg: String) -> std::io::Result<()> {
        if arg == "F" {
            self.write_control(response::COMMAND_OK).await
        } else {
            self.write_control(response::PARAMETER_NOT_IMPLEMENTED).await
        }
    }

    // --- data-channel setup ---

    async fn handle_port(&mut self, arg: String) -> std::io::Result<()> {
        let Some(addr) = commands::parse_port_arg(&arg) else {
            return self.write_control(response::SYNTAX_ERROR_ARGS).await;
        };
        self.data.set_active(addr);
        self.passive = Some(false);
        self.write_control(response::COMMAND_OK).await
    }

    async fn handle_pasv(&mut self) -> std::io::Result<()> {
        if !self.data.has_passive_listener() {
            let bind_addr = format!("{}:0", self.config.addr);
            match tokio::net::TcpListener::bind(&bind_addr).await {
                Ok(listener) => self.data.set_passive(listener),
                Err(err) => {
                    tracing::warn!(peer = %self.peer_addr, error = %err, "failed to open passive data port");
                    self.quitting = true;
                    return self.write_control(response::SERVICE_CLOSING).await;
                }
            }
        }
        let local = self
            .data
            .local_addr()
            .expect("passive listener was just ensured");
        let (h1, h2, h3, h4) = match local.ip() {
            std::net::IpAddr::V4(v4) => {
                let o = v4.octets();
                (o[0], o[1], o[2], o[3])
            }
            std::net::IpAddr::V6(_) => (127, 0, 0, 1),
        };
        let port = local.port();
        self.passive = Some(true);
        let reply = response::passive_mode(
            h1,
            h2,
            h3,
            h4,
            (port / 256) as u8,
            (port % 256) as u8,
        );
        self.write_control(&reply).await
    }

    // --- navigation ---

    async fn handle_pwd(&mut self) -> std::io::Result<()> {
        let shown = resolver::virtualize(&self.jail_dir, &self.work_dir);
        let reply = response::current_dir(&shown);
        self.write_control(&reply).await
    }

    async fn handle_cwd(&mut self, arg: String) -> std::io::Result<()> {
        let resolved = match resolver::resolve(&self.jail_dir, &self.work_dir, &arg) {
            Ok(p) => p,
            Err(_) => return self.write_control(response::FILE_UNAVAILABLE).await,
        };
        match tokio::fs::metadata(&resolved).await {
            Ok(meta) if meta.is_dir() => {
                self.work_dir = resolved;
                self.write_control(response::ACTION_OK).await
            }
            _ => self.write_control(response::FILE_UNAVAILABLE).await,
        }
    }

    async fn handle_cdup(&mut self) -> std::io::Result<()> {
        // The resolver clamps ".." at the jail root, so a CDUP already at
        // the root resolves to work_dir unchanged rather than failing;
        // that case is itself the 550.
        match resolver::resolve(&self.jail_dir, &self.work_dir, "..") {
            Ok(resolved) if resolved == self.work_dir => {
                self.write_control(response::FILE_UNAVAILABLE).await
            }
            Ok(resolved) => {
                self.work_dir = resolved;
                self.write_control(response::COMMAND_OK).await
            }
            Err(_) => self.write_control(response::FILE_UNAVAILABLE).await,
        }
    }

    async fn handle_mkd(&mut self, arg: String) -> std::io::Result<()> {
        let resolved = match resolver::resolve(&self.jail_dir, &self.work_dir, &arg) {
            Ok(p) => p,
            Err(_) => return self.write_control(response::FILE_UNAVAILABLE).await,
        };
        match tokio::fs::create_dir(&resolved).await {
            Ok(()) => {
                let shown = resolver::virtualize(&self.jail_dir, &resolved);
                let reply = response::created(&shown);
                self.write_control(&reply).await
            }
            Err(_) => self.write_control(response::FILE_UNAVAILABLE).await,
        }
    }

    async fn handle_rmd(&mut self, arg: String) -> std::io::Result<()> {
        let resolved = match resolver::resolve(&self.jail_dir, &self.work_dir, &arg) {
            Ok(p) => p,
            Err(_) => return self.write_control(response::FILE_UNAVAILABLE).await,
        };
        match tokio::fs::metadata(&resolved).await {
            Ok(meta) if meta.is_dir() => match tokio::fs::remove_dir(&resolved).await {
                Ok(()) => self.write_control(response::ACTION_OK).await,
                Err(_) => self.write_control(response::FILE_UNAVAILABLE).await,
            },
            _ => self.write_control(response::FILE_UNAVAILABLE).await,
        }
    }

    async fn handle_dele(&mut self, arg: String) -> std::io::Result<()> {
        let resolved = match resolver::resolve(&self.jail_dir, &self.work_dir, &arg) {
            Ok(p) => p,
            Err(_) => return self.write_control(response::FILE_UNAVAILABLE).await,
        };
        match tokio::fs::metadata(&resolved).await {
            Ok(meta) if meta.is_file() => match tokio::fs::remove_file(&resolved).await {
                Ok(()) => self.write_control(response::ACTION_OK).await,
                Err(_) => self.write_control(response::FILE_UNAVAILABLE).await,
            },
            _ => self.write_control(response::FILE_UNAVAILABLE).await,
        }
    }

    async fn handle_rnfr(&mut self, arg: String) -> std::io::Result<()> {
        let resolved = match resolver::resolve(&self.jail_dir, &self.work_dir, &arg) {
            Ok(p) => p,
            Err(_) => return self.write_control(response::FILE_UNAVAILABLE).await,
        };
        if tokio::fs::metadata(&resolved).await.is_err() {
            return self.write_control(response::FILE_UNAVAILABLE).await;
        }
        self.rename_from = Some(resolved);
        self.write_control(response::PENDING_INFO).await
    }

    async fn handle_rnto(&mut self, arg: String) -> std::io::Result<()> {
        let Some(from) = self.rename_from.take() else {
            return self.write_control(response::BAD_SEQUENCE).await;
        };
        let to = match resolver::resolve(&self.jail_dir, &self.work_dir, &arg) {
            Ok(p) => p,
            Err(_) => return self.write_control(response::FILE_ACTION_FAILED).await,
        };
        match tokio::fs::rename(&from, &to).await {
            Ok(()) => self.write_control(response::ACTION_OK).await,
            Err(_) => self.write_control(response::FILE_ACTION_FAILED).await,
        }
    }

    // --- listings ---

    async fn handle_list(&mut self, arg: Option<String>) -> std::io::Result<()> {
        let path = arg.as_deref().unwrap_or("");
        let resolved = match resolver::resolve(&self.jail_dir, &self.work_dir, path) {
            Ok(p) => p,
            Err(_) => return self.write_control(response::ACTION_NOT_TAKEN).await,
        };
        let body = match listing::list_body(&resolved, self.owner_lookup) {
            Ok(body) => body,
            Err(_) => return self.write_control(response::ACTION_NOT_TAKEN).await,
        };
        self.write_control(&response::opening_data("ASCII")).await?;
        let final_reply = self.data.write_bytes(body.as_bytes()).await;
        self.write_control(final_reply).await
    }

    async fn handle_nlst(&mut self, arg: Option<String>) -> std::io::Result<()> {
        let path = arg.as_deref().unwrap_or("");
        let resolved = match resolver::resolve(&self.jail_dir, &self.work_dir, path) {
            Ok(p) => p,
            Err(_) => return self.write_control(response::ACTION_NOT_TAKEN).await,
        };
        let body = match listing::nlst_body(&resolved) {
            Ok(body) => body,
            Err(_) => return self.write_control(response::ACTION_NOT_TAKEN).await,
        };
        self.write_control(&response::opening_data("ASCII")).await?;
        let final_reply = self.data.write_bytes(body.as_bytes()).await;
        self.write_control(final_reply).await
    }

    // --- file transfers ---

    fn type_label(&self) -> &'static str {
        match self.data_type {
            DataType::Ascii => "ASCII",
            DataType::Image => "BINARY",
        }
    }

    async fn handle_retr(&mut self, arg: String) -> std::io::Result<()> {
        let resolved = match resolver::resolve(&self.jail_dir, &self.work_dir, &arg) {
            Ok(p) => p,
            Err(_) => return self.write_control(response::ACTION_NOT_TAKEN).await,
        };
        let mut file = match tokio::fs::File::open(&resolved).await {
            Ok(f) => f,
            Err(_) => return self.write_control(response::ACTION_NOT_TAKEN).await,
        };

        self.write_control(&response::opening_data(self.type_label())).await?;

        let mut stream = match self.data.dial().await {
            Ok(s) => s,
            Err(_) => return self.write_control(response::CANT_OPEN_DATA).await,
        };

        let mut buf = [0u8; 4096];
        loop {
            let n = match file.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(_) => return self.write_control(response::TRANSFER_ABORTED).await,
            };
            if stream.write_all(&buf[..n]).await.is_err() {
                return self.write_control(response::TRANSFER_ABORTED).await;
            }
        }
        let _ = stream.shutdown().await;
        self.write_control(response::CLOSING_DATA).await
    }

    async fn handle_stor(&mut self, arg: String, append: bool) -> std::io::Result<()> {
        let resolved = match resolver::resolve(&self.jail_dir, &self.work_dir, &arg) {
            Ok(p) => p,
            Err(_) => return self.write_control(response::FILE_ACTION_FAILED).await,
        };
        let mut file = {
            let mut options = tokio::fs::OpenOptions::new();
            options.write(true).create(true);
            if append {
                options.append(true);
            } else {
                options.truncate(true);
            }
            match options.open(&resolved).await {
                Ok(f) => f,
                Err(_) => return self.write_control(response::FILE_ACTION_FAILED).await,
            }
        };

        self.write_control(&response::opening_data(self.type_label())).await?;

        let mut stream = match self.data.dial().await {
            Ok(s) => s,
            Err(_) => return self.write_control(response::CANT_OPEN_DATA).await,
        };

        let mut buf = [0u8; 4096];
        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(_) => return self.write_control(response::TRANSFER_ABORTED).await,
            };
            if file.write_all(&buf[..n]).await.is_err() {
                return self.write_control(response::TRANSFER_ABORTED).await;
            }
        }
        self.write_control(response::CLOSING_DATA).await
    }

    // --- extensions (MDTM / SIZE) ---

    async fn handle_mdtm(&mut self, arg: String) -> std::io::Result<()> {
        let resolved = match resolver::resolve(&self.jail_dir, &self.work_dir, &arg) {
            Ok(p) => p,
            Err(_) => return self.write_control(response::FILE_UNAVAILABLE).await,
        };
        match tokio::fs::metadata(&resolved).await {
            Ok(meta) => match meta.modified() {
                Ok(time) => {
                    let stamp: chrono::DateTime<chrono::Utc> = time.into();
                    let reply = response::mdtm(&stamp.format("%Y%m%d%H%M%S").to_string());
                    self.write_control(&reply).await
                }
                Err(_) => self.write_control(response::FILE_UNAVAILABLE).await,
            },
            Err(_) => self.write_control(response::FILE_UNAVAILABLE).await,
        }
    }

    async fn handle_size(&mut self, arg: String) -> std::io::Result<()> {
        let resolved = match resolver::resolve(&self.jail_dir, &self.work_dir, &arg) {
            Ok(p) => p,
            Err(_) => return self.write_control(response::FILE_UNAVAILABLE).await,
        };
        match tokio::fs::metadata(&resolved).await {
            Ok(meta) => {
                let reply = response::size(meta.len());
                self.write_control(&reply).await
            }
            Err(_) => self.write_control(response::FILE_UNAVAILABLE).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, DuplexStream};
    use tokio::net::TcpStream as TestTcpStream;

    fn peer() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }

    /// Spawns a `Session` driven over an in-memory duplex pair, returning
    /// the client-facing half (buffered for line reads) and the task
    /// handle. The data channel, when exercised, still goes over a real
    /// loopback `TcpStream` since PASV hands out a genuine socket address.
    async fn spawn_session(
        jail: &std::path::Path,
        mut config: Config,
    ) -> (BufReader<DuplexStream>, tokio::task::JoinHandle<()>) {
        config.jail = jail.to_path_buf();
        let (client, server) = tokio::io::duplex(8192);
        let boxed: BoxedControl = Box::new(server);
        let session = Session::new(boxed, Arc::new(config), peer(), None, false)
            .unwrap()
            .with_owner_lookup(listing::unknown_owner);
        let handle = tokio::spawn(async move {
            let _ = session.run().await;
        });
        (BufReader::new(client), handle)
    }

    async fn read_line(client: &mut BufReader<DuplexStream>) -> String {
        let mut line = String::new();
        client.read_line(&mut line).await.unwrap();
        line.trim_end_matches(['\r', '\n']).to_string()
    }

    async fn send(client: &mut BufReader<DuplexStream>, line: &str) {
        client
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();
    }

    async fn login_no_password(client: &mut BufReader<DuplexStream>) {
        assert_eq!(read_line(client).await, response::READY.trim_end());
        send(client, "USER anyone").await;
        assert_eq!(read_line(client).await, response::LOGGED_IN.trim_end());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn wrong_user_when_login_restricted() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            login: "alice".to_string(),
            password_hash: crate::auth::hash("hunter2").unwrap(),
            ..Default::default()
        };
        let (mut client, _handle) = spawn_session(dir.path(), config).await;

        assert_eq!(read_line(&mut client).await, response::READY.trim_end());
        send(&mut client, "USER bob").await;
        assert_eq!(read_line(&mut client).await, response::NOT_LOGGED_IN.trim_end());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn login_with_correct_password() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            login: "alice".to_string(),
            password_hash: crate::auth::hash("hunter2").unwrap(),
            ..Default::default()
        };
        let (mut client, _handle) = spawn_session(dir.path(), config).await;

        assert_eq!(read_line(&mut client).await, response::READY.trim_end());
        send(&mut client, "USER alice").await;
        assert_eq!(read_line(&mut client).await, response::NEED_PASSWORD.trim_end());
        send(&mut client, "PASS hunter2").await;
        assert_eq!(read_line(&mut client).await, response::LOGGED_IN.trim_end());

        send(&mut client, "PASS wrong").await;
        assert_eq!(read_line(&mut client).await, response::NOT_LOGGED_IN.trim_end());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn commands_before_login_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let (mut client, _handle) = spawn_session(dir.path(), config).await;

        assert_eq!(read_line(&mut client).await, response::READY.trim_end());
        send(&mut client, "PWD").await;
        assert_eq!(read_line(&mut client).await, response::NOT_LOGGED_IN.trim_end());
        send(&mut client, "NOOP").await;
        assert_eq!(read_line(&mut client).await, response::COMMAND_OK.trim_end());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn abor_with_no_transfer_in_flight_uses_its_own_wording() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let (mut client, _handle) = spawn_session(dir.path(), config).await;
        login_no_password(&mut client).await;

        send(&mut client, "ABOR").await;
        assert_eq!(read_line(&mut client).await, response::ABOR_NO_TRANSFER.trim_end());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cwd_cannot_escape_jail() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let (mut client, _handle) = spawn_session(dir.path(), config).await;
        login_no_password(&mut client).await;

        send(&mut client, "CWD ../../../../etc").await;
        assert_eq!(read_line(&mut client).await, response::FILE_UNAVAILABLE.trim_end());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pwd_virtualizes_the_jail_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let (mut client, _handle) = spawn_session(dir.path(), config).await;
        login_no_password(&mut client).await;

        send(&mut client, "PWD").await;
        assert_eq!(read_line(&mut client).await, "257 \"/\" is the current directory.");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mkd_then_rmd_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let (mut client, _handle) = spawn_session(dir.path(), config).await;
        login_no_password(&mut client).await;

        send(&mut client, "MKD sub").await;
        assert_eq!(read_line(&mut client).await, "257 \"/sub\" created.");
        assert!(dir.path().join("sub").is_dir());

        send(&mut client, "RMD sub").await;
        assert_eq!(read_line(&mut client).await, response::ACTION_OK.trim_end());
        assert!(!dir.path().join("sub").exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cdup_at_jail_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let (mut client, _handle) = spawn_session(dir.path(), config).await;
        login_no_password(&mut client).await;

        send(&mut client, "CDUP").await;
        assert_eq!(read_line(&mut client).await, response::FILE_UNAVAILABLE.trim_end());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cdup_from_subdirectory_returns_to_parent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let config = Config::default();
        let (mut client, _handle) = spawn_session(dir.path(), config).await;
        login_no_password(&mut client).await;

        send(&mut client, "CWD sub").await;
        assert_eq!(read_line(&mut client).await, response::ACTION_OK.trim_end());

        send(&mut client, "CDUP").await;
        assert_eq!(read_line(&mut client).await, response::COMMAND_OK.trim_end());

        send(&mut client, "PWD").await;
        assert_eq!(read_line(&mut client).await, "257 \"/\" is the current directory.");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rnto_without_prior_rnfr_is_bad_sequence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let config = Config::default();
        let (mut client, _handle) = spawn_session(dir.path(), config).await;
        login_no_password(&mut client).await;

        send(&mut client, "RNTO b.txt").await;
        assert_eq!(read_line(&mut client).await, response::BAD_SEQUENCE.trim_end());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rename_across_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let config = Config::default();
        let (mut client, _handle) = spawn_session(dir.path(), config).await;
        login_no_password(&mut client).await;

        send(&mut client, "RNFR a.txt").await;
        assert_eq!(read_line(&mut client).await, response::PENDING_INFO.trim_end());
        send(&mut client, "RNTO sub/b.txt").await;
        assert_eq!(read_line(&mut client).await, response::ACTION_OK.trim_end());
        assert!(dir.path().join("sub/b.txt").is_file());

        // The rename_from slot was consumed; a second RNTO with no new
        // RNFR is a protocol error, not a silent no-op.
        send(&mut client, "RNTO c.txt").await;
        assert_eq!(read_line(&mut client).await, response::BAD_SEQUENCE.trim_end());
    }

    async fn pasv_addr(client: &mut BufReader<DuplexStream>) -> SocketAddr {
        send(client, "PASV").await;
        let line = read_line(client).await;
        let inner = line
            .split('(')
            .nth(1)
            .and_then(|s| s.split(')').next())
            .expect("227 reply carries a (h1,h2,h3,h4,p1,p2) tuple");
        let fields: Vec<u16> = inner.split(',').map(|f| f.parse().unwrap()).collect();
        let ip = std::net::Ipv4Addr::new(
            fields[0] as u8,
            fields[1] as u8,
            fields[2] as u8,
            fields[3] as u8,
        );
        let port = fields[4] * 256 + fields[5];
        SocketAddr::from((ip, port))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn passive_nlst_lists_directory_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let config = Config::default();
        let (mut client, _handle) = spawn_session(dir.path(), config).await;
        login_no_password(&mut client).await;

        let data_addr = pasv_addr(&mut client).await;
        send(&mut client, "NLST").await;
        assert_eq!(read_line(&mut client).await, "150 Opening ASCII mode data connection.");

        let mut data = TestTcpStream::connect(data_addr).await.unwrap();
        let mut body = Vec::new();
        data.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"a.txt\r\n");

        assert_eq!(read_line(&mut client).await, response::CLOSING_DATA.trim_end());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_then_retrieve_round_trips_binary_body() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let (mut client, _handle) = spawn_session(dir.path(), config).await;
        login_no_password(&mut client).await;

        send(&mut client, "TYPE I").await;
        assert_eq!(read_line(&mut client).await, response::COMMAND_OK.trim_end());

        let body: &[u8] = &[0x01, 0x02, 0x03, 0x04, 0x05];

        let data_addr = pasv_addr(&mut client).await;
        send(&mut client, "STOR hello.bin").await;
        assert_eq!(read_line(&mut client).await, "150 Opening BINARY mode data connection.");
        let mut upload = TestTcpStream::connect(data_addr).await.unwrap();
        upload.write_all(body).await.unwrap();
        upload.shutdown().await.unwrap();
        assert_eq!(read_line(&mut client).await, response::CLOSING_DATA.trim_end());

        let data_addr = pasv_addr(&mut client).await;
        send(&mut client, "RETR hello.bin").await;
        assert_eq!(read_line(&mut client).await, "150 Opening BINARY mode data connection.");
        let mut download = TestTcpStream::connect(data_addr).await.unwrap();
        let mut received = Vec::new();
        download.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, body);
        assert_eq!(read_line(&mut client).await, response::CLOSING_DATA.trim_end());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn appe_concatenates_onto_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let (mut client, _handle) = spawn_session(dir.path(), config).await;
        login_no_password(&mut client).await;

        let data_addr = pasv_addr(&mut client).await;
        send(&mut client, "STOR log.txt").await;
        assert_eq!(read_line(&mut client).await, "150 Opening BINARY mode data connection.");
        let mut upload = TestTcpStream::connect(data_addr).await.unwrap();
        upload.write_all(b"first").await.unwrap();
        upload.shutdown().await.unwrap();
        assert_eq!(read_line(&mut client).await, response::CLOSING_DATA.trim_end());

        let data_addr = pasv_addr(&mut client).await;
        send(&mut client, "APPE log.txt").await;
        assert_eq!(read_line(&mut client).await, "150 Opening BINARY mode data connection.");
        let mut upload = TestTcpStream::connect(data_addr).await.unwrap();
        upload.write_all(b"second").await.unwrap();
        upload.shutdown().await.unwrap();
        assert_eq!(read_line(&mut client).await, response::CLOSING_DATA.trim_end());

        let contents = std::fs::read(dir.path().join("log.txt")).unwrap();
        assert_eq!(contents, b"firstsecond");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn quit_closes_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let (mut client, handle) = spawn_session(dir.path(), config).await;
        login_no_password(&mut client).await;

        send(&mut client, "QUIT").await;
        assert_eq!(read_line(&mut client).await, response::GOODBYE.trim_end());
        handle.await.unwrap();
    }
}
