//! Numeric reply codes and their canned text, one place for every string
//! the dispatcher ever writes back on the control channel.

pub const READY: &str = "220 Service ready for new user.\r\n";
pub const REIN_READY: &str = "220 Service ready for new user.\r\n";
pub const COMMAND_OK: &str = "200 Command okay.\r\n";
pub const SUPERFLUOUS: &str = "202 Command not implemented, superfluous at this site.\r\n";
pub const FEAT_BODY: &str = "211-Features:\r\n AUTH TLS\r\n PBSZ\r\n PROT\r\n UTF8\r\n211 End\r\n";
pub const HELP_BODY: &str = "214-The following commands are recognized:\r\n USER PASS QUIT REIN PORT PASV TYPE MODE STRU PWD CWD CDUP MKD RMD DELE LIST NLST RNFR RNTO RETR STOR APPE NOOP ACCT ALLO SITE AUTH PBSZ PROT SYST FEAT HELP MDTM SIZE ABOR\r\n214 Help ok.\r\n";
pub const SYST_INFO: &str = "215 UNIX Type: L8\r\n";
pub const GOODBYE: &str = "221 Service closing control connection.\r\n";
pub const CLOSING_DATA: &str = "226 Closing data connection.\r\n";
pub const ABOR_NO_TRANSFER: &str = "226 No transfer in progress.\r\n";
pub const LOGGED_IN: &str = "230 User logged in, proceed.\r\n";
pub const ACTION_OK: &str = "250 Requested file action okay, completed.\r\n";
pub const NEED_PASSWORD: &str = "331 User name okay, need password.\r\n";
pub const PENDING_INFO: &str = "350 Requested file action pending further information.\r\n";
pub const SERVICE_CLOSING: &str = "421 Service not available, closing control connection.\r\n";
pub const CANT_OPEN_DATA: &str = "425 Can't open data connection.\r\n";
pub const TRANSFER_ABORTED: &str = "426 Connection closed; transfer aborted.\r\n";
pub const ACTION_NOT_TAKEN: &str = "450 Requested file action not taken.\r\n";
pub const SYNTAX_ERROR: &str = "500 Syntax error, command unrecognized.\r\n";
pub const SYNTAX_ERROR_ARGS: &str = "501 Syntax error in parameters or arguments.\r\n";
pub const NOT_IMPLEMENTED: &str = "502 Command not implemented.\r\n";
pub const BAD_SEQUENCE: &str = "503 Bad sequence of commands.\r\n";
pub const PARAMETER_NOT_IMPLEMENTED: &str = "504 Command not implemented for that parameter.\r\n";
pub const NOT_LOGGED_IN: &str = "530 Not logged in.\r\n";
pub const FILE_UNAVAILABLE: &str = "550 Requested action not taken.\r\n";
pub const FILE_ACTION_FAILED: &str = "553 Requested action not taken.\r\n";

pub fn already_secured() -> String {
    "503 Already secured.\r\n".to_string()
}

pub fn auth_tls_ok() -> String {
    "234 AUTH TLS successful, proceeding with negotiation.\r\n".to_string()
}

pub fn opening_data(kind: &str) -> String {
    format!("150 Opening {kind} mode data connection.\r\n")
}

pub fn passive_mode(h1: u8, h2: u8, h3: u8, h4: u8, p1: u8, p2: u8) -> String {
    format!("227 Entering Passive Mode ({h1},{h2},{h3},{h4},{p1},{p2}).\r\n")
}

pub fn current_dir(path: &str) -> String {
    format!("257 \"{path}\" is the current directory.\r\n")
}

pub fn created(path: &str) -> String {
    format!("257 \"{path}\" created.\r\n")
}

pub fn mdtm(stamp: &str) -> String {
    format!("213 {stamp}\r\n")
}

pub fn size(bytes: u64) -> String {
    format!("213 {bytes}\r\n")
}
