//! The FTP verb table and the line-to-command parser.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FtpCommand {
    User(String),
    Pass(String),
    Quit,
    Rein,
    Noop,
    Acct,
    Allo,
    Site,
    Auth(String),
    Pbsz(String),
    Prot(String),
    Type(String),
    Mode(String),
    Stru(String),
    Port(String),
    Pasv,
    Pwd,
    Cwd(String),
    Cdup,
    Mkd(String),
    Rmd(String),
    Dele(String),
    List(Option<String>),
    Nlst(Option<String>),
    Rnfr(String),
    Rnto(String),
    Retr(String),
    Stor(String),
    Appe(String),
    Syst,
    Feat,
    Help,
    Mdtm(String),
    Size(String),
    Abor,
    /// A verb not in the supported table; dispatched to a 502 reply.
    Unknown(String),
}

fn some_if_nonempty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Splits `line` on the first ASCII space into verb and argument (the
/// verb match is case-sensitive).
pub fn parse_command(line: &str) -> FtpCommand {
    let line = line.trim_end_matches(['\r', '\n']);
    let (verb, arg) = match line.split_once(' ') {
        Some((verb, arg)) => (verb, arg.trim()),
        None => (line, ""),
    };

    match verb {
        "USER" => FtpCommand::User(arg.to_string()),
        "PASS" => FtpCommand::Pass(arg.to_string()),
        "QUIT" => FtpCommand::Quit,
        "REIN" => FtpCommand::Rein,
        "NOOP" => FtpCommand::Noop,
        "ACCT" => FtpCommand::Acct,
        "ALLO" => FtpCommand::Allo,
        "SITE" => FtpCommand::Site,
        "AUTH" => FtpCommand::Auth(arg.to_string()),
        "PBSZ" => FtpCommand::Pbsz(arg.to_string()),
        "PROT" => FtpCommand::Prot(arg.to_string()),
        "TYPE" => FtpCommand::Type(arg.to_string()),
        "MODE" => FtpCommand::Mode(arg.to_string()),
        "STRU" => FtpCommand::Stru(arg.to_string()),
        "PORT" => FtpCommand::Port(arg.to_string()),
        "PASV" => FtpCommand::Pasv,
        "PWD" => FtpCommand::Pwd,
        "CWD" => FtpCommand::Cwd(arg.to_string()),
        "CDUP" => FtpCommand::Cdup,
        "MKD" => FtpCommand::Mkd(arg.to_string()),
        "RMD" => FtpCommand::Rmd(arg.to_string()),
        "DELE" => FtpCommand::Dele(arg.to_string()),
        "LIST" => FtpCommand::List(some_if_nonempty(arg)),
        "NLST" => FtpCommand::Nlst(some_if_nonempty(arg)),
        "RNFR" => FtpCommand::Rnfr(arg.to_string()),
        "RNTO" => FtpCommand::Rnto(arg.to_string()),
        "RETR" => FtpCommand::Retr(arg.to_string()),
        "STOR" => FtpCommand::Stor(arg.to_string()),
        "APPE" => FtpCommand::Appe(arg.to_string()),
        "SYST" => FtpCommand::Syst,
        "FEAT" => FtpCommand::Feat,
        "HELP" => FtpCommand::Help,
        "MDTM" => FtpCommand::Mdtm(arg.to_string()),
        "SIZE" => FtpCommand::Size(arg.to_string()),
        "ABOR" => FtpCommand::Abor,
        other => FtpCommand::Unknown(other.to_string()),
    }
}

/// Parses a PORT argument `h1,h2,h3,h4,p1,p2` into a socket address.
/// Fields are six decimal bytes (0..=255); the port is `p1*256 + p2`.
pub fn parse_port_arg(arg: &str) -> Option<std::net::SocketAddr> {
    let fields: Vec<&str> = arg.split(',').collect();
    if fields.len() != 6 {
        return None;
    }
    let mut bytes = [0u8; 6];
    for (slot, field) in bytes.iter_mut().zip(fields.iter()) {
        *slot = field.trim().parse().ok()?;
    }
    let ip = std::net::Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
    let port = (bytes[4] as u16) * 256 + bytes[5] as u16;
    Some(std::net::SocketAddr::from((ip, port)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_verb_and_argument() {
        assert_eq!(
            parse_command("USER alice"),
            FtpCommand::User("alice".to_string())
        );
        assert_eq!(parse_command("PWD"), FtpCommand::Pwd);
    }

    #[test]
    fn unknown_verb_is_preserved() {
        assert_eq!(
            parse_command("FROB x"),
            FtpCommand::Unknown("FROB".to_string())
        );
    }

    #[test]
    fn list_with_no_argument_is_none() {
        assert_eq!(parse_command("LIST"), FtpCommand::List(None));
        assert_eq!(parse_command("LIST "), FtpCommand::List(None));
    }

    #[test]
    fn port_arg_parses_six_bytes() {
        let addr = parse_port_arg("127,0,0,1,195,80").unwrap();
        assert_eq!(addr, "127.0.0.1:50000".parse().unwrap());
    }

    #[test]
    fn port_arg_rejects_bad_field() {
        assert!(parse_port_arg("127,0,0,1,300,80").is_none());
        assert!(parse_port_arg("127,0,0,1,80").is_none());
    }
}
