//! Telnet protocol plumbing: command/option constants, the IAC command state
//! machine, and the line/IAC stream scanner.
//!
//! IANA's registry of Telnet option assignments:
//! <https://www.iana.org/assignments/telnet-options/telnet-options.xhtml>

pub mod iac;
pub mod scanner;

/// Standard Telnet commands. See [RFC 854](https://tools.ietf.org/html/rfc854).
pub mod command {
    /// Interpret As Command.
    pub const IAC: u8 = 255;
    /// Don't do something.
    pub const DONT: u8 = 254;
    /// Do something.
    pub const DO: u8 = 253;
    /// Won't do something.
    pub const WONT: u8 = 252;
    /// Will do something.
    pub const WILL: u8 = 251;
    /// Subnegotiation Begin.
    pub const SB: u8 = 250;
    /// Go Ahead.
    pub const GA: u8 = 249;
    /// Erase Line.
    pub const EL: u8 = 248;
    /// Erase Character.
    pub const EC: u8 = 247;
    /// Are You There?
    pub const AYT: u8 = 246;
    /// Abort Output.
    pub const AO: u8 = 245;
    /// Interrupt Process.
    pub const IP: u8 = 244;
    /// NVT character BRK.
    pub const BREAK: u8 = 243;
    /// Data Mark.
    pub const DM: u8 = 242;
    /// No Operation.
    pub const NOP: u8 = 241;
    /// Subnegotiation End.
    pub const SE: u8 = 240;
    /// End Of Record.
    pub const EOR: u8 = 239;

    /// (Linemode) Abort. See [RFC 1116](https://tools.ietf.org/html/rfc1116).
    pub const LM_ABORT: u8 = 238;
    /// (Linemode) Suspend.
    pub const LM_SUSP: u8 = 237;
    /// (Linemode) End Of File.
    pub const LM_EOF: u8 = 236;
}

/// Telnet option codes, from the RFC series plus the MUD-specific extensions.
#[allow(clippy::doc_markdown)]
pub mod option {
    /// [RFC856] Binary Transmission.
    pub const BINARY: u8 = 0;
    /// [RFC857] Echo.
    pub const ECHO: u8 = 1;
    /// [NIC5005] Telnet Reconnection.
    pub const RCP: u8 = 2;
    /// [RFC858] Suppress GA (Go Ahead).
    pub const SGA: u8 = 3;
    /// Negotiate About Message Size.
    pub const NAMS: u8 = 4;
    /// [RFC859] Status.
    pub const STATUS: u8 = 5;
    /// [RFC860] Timing Mark.
    pub const TM: u8 = 6;
    /// [RFC726] Remote Controlled Transmission and Echoing.
    pub const RCTE: u8 = 7;
    /// [NIC5005] Negotiate About Output Line Width.
    pub const NAOL: u8 = 8;
    /// [NIC5005] Negotiate About Output Page Size.
    pub const NAOP: u8 = 9;
    /// [RFC652] Output Carriage-Return Disposition.
    pub const NAOCRD: u8 = 10;
    /// [RFC653] Output Horizontal Tab Stops.
    pub const NAOHTS: u8 = 11;
    /// [RFC654] Output Horizontal Tab Disposition.
    pub const NAOHTD: u8 = 12;
    /// [RFC655] Output Formfeed Disposition.
    pub const NAOFFD: u8 = 13;
    /// [RFC656] Output Vertical Tabstops.
    pub const NAOVTS: u8 = 14;
    /// [RFC657] Output Vertical Tab Disposition.
    pub const NAOVTD: u8 = 15;
    /// [RFC658] Output Linefeed Disposition.
    pub const NAOLFD: u8 = 16;
    /// [RFC698] Extended ASCII.
    pub const XASCII: u8 = 17;
    /// [RFC727] Logout.
    pub const LOGOUT: u8 = 18;
    /// [RFC735] Byte Macro.
    pub const BM: u8 = 19;
    /// [RFC1043] Data Entry Terminal.
    pub const DET: u8 = 20;
    /// [RFC736] SUPDUP Display Protocol.
    pub const SUPDUP: u8 = 21;
    /// [RFC749] SUPDUP OUTPUT.
    pub const SUPDUP_OUT: u8 = 22;
    /// [RFC779] Send Location.
    pub const SNDLOC: u8 = 23;
    /// [RFC1091] Terminal Type.
    pub const TTYPE: u8 = 24;
    /// Negotiate About EOR.
    pub const EOR: u8 = 25;
    /// [RFC927] TACACS User Identification.
    pub const TUID: u8 = 26;
    /// [RFC933] Output Marking.
    pub const OUTMRK: u8 = 27;
    /// [RFC946] Terminal Location Number.
    pub const TTYLOC: u8 = 28;
    /// [RFC1041] Telnet 3270 Regime.
    pub const T3270: u8 = 29;
    /// [RFC1053] X.3 PAD.
    pub const X3PAD: u8 = 30;
    /// [RFC1073] Negotiate About Window Size.
    pub const NAWS: u8 = 31;
    /// [RFC1079] Terminal Speed.
    pub const TSPEED: u8 = 32;
    /// [RFC1372] Remote Flow Control.
    pub const LFLOW: u8 = 33;
    /// [RFC1116] Linemode.
    pub const LINEMODE: u8 = 34;
    /// [RFC1096] X Display Location.
    pub const XDISPLOC: u8 = 35;
    /// [RFC1408] Environment Option.
    pub const ENVIRON: u8 = 36;
    /// [RFC2941] Authentication.
    pub const AUTH: u8 = 37;
    /// [RFC2946] Encryption.
    pub const ENCRYPT: u8 = 38;
    /// [RFC1572] New Environment.
    pub const NENV: u8 = 39;
    /// [RFC2355] TN3270 Enhancements.
    pub const TN3270E: u8 = 40;
    /// XAUTH.
    pub const XAUTH: u8 = 41;
    /// [RFC2066] Charset.
    pub const CHARSET: u8 = 42;
    /// [RFC2217] Com Port Control.
    pub const COMPORT: u8 = 44;
    /// [RFC2840] KERMIT.
    pub const KERMIT: u8 = 47;

    /// MUD Server Status Protocol.
    pub const MSSP: u8 = 70;
    /// MUD Client Compression Protocol.
    pub const MCCP: u8 = 85;
    /// MUD Client Compression Protocol 2.0.
    pub const MCCP2: u8 = 86;
    /// MUD eXtension Protocol.
    pub const MXP: u8 = 91;
    /// Zenith MUD Protocol.
    pub const ZMP: u8 = 93;
    /// Generic MUD Communication Protocol.
    pub const GMCP: u8 = 201;
}

/// Mnemonic for a Telnet command or option byte, if it has one.
///
/// The table is keyed the way servers use the bytes in practice: the command
/// range (236..=255) renders as command names, everything below as option
/// names. Codes without an assignment return `None` and render numerically.
#[must_use]
pub fn code_name(code: u8) -> Option<&'static str> {
    Some(match code {
        command::IAC => "IAC",
        command::DONT => "DONT",
        command::DO => "DO",
        command::WONT => "WONT",
        command::WILL => "WILL",
        command::SB => "SB",
        command::GA => "GA",
        command::EL => "EL",
        command::EC => "EC",
        command::AYT => "AYT",
        command::AO => "AO",
        command::IP => "IP",
        command::BREAK => "BREAK",
        command::DM => "DM",
        command::NOP => "NOP",
        command::SE => "SE",
        command::EOR => "EOR",
        command::LM_ABORT => "ABORT",
        command::LM_SUSP => "SUSP",
        command::LM_EOF => "EOF",
        option::BINARY => "BINARY",
        option::ECHO => "ECHO",
        option::RCP => "RCP",
        option::SGA => "SGA",
        option::NAMS => "NAMS",
        option::STATUS => "STATUS",
        option::TM => "TM",
        option::RCTE => "RCTE",
        option::NAOL => "NAOL",
        option::NAOP => "NAOP",
        option::NAOCRD => "NAOCRD",
        option::NAOHTS => "NAOHTS",
        option::NAOHTD => "NAOHTD",
        option::NAOFFD => "NAOFFD",
        option::NAOVTS => "NAOVTS",
        option::NAOVTD => "NAOVTD",
        option::NAOLFD => "NAOLFD",
        option::XASCII => "XASCII",
        option::LOGOUT => "LOGOUT",
        option::BM => "BM",
        option::DET => "DET",
        option::SUPDUP => "SUP",
        option::SUPDUP_OUT => "SUPOUT",
        option::SNDLOC => "SNDLOC",
        option::TTYPE => "TTYPE",
        option::EOR => "EOR",
        option::TUID => "TUID",
        option::OUTMRK => "OUTMRK",
        option::TTYLOC => "TTYLOC",
        option::T3270 => "3270",
        option::X3PAD => "X3PAD",
        option::NAWS => "NAWS",
        option::TSPEED => "TSPEED",
        option::LFLOW => "LFLOW",
        option::LINEMODE => "LINEMODE",
        option::XDISPLOC => "XDISPLOC",
        option::ENVIRON => "ENVIRON",
        option::AUTH => "AUTH",
        option::ENCRYPT => "ENCRYPT",
        option::NENV => "NENV",
        option::TN3270E => "TN3270E",
        option::XAUTH => "XAUTH",
        option::CHARSET => "CHARSET",
        option::COMPORT => "COMPORT",
        option::KERMIT => "KERMIT",
        option::MSSP => "MSSP",
        option::MCCP => "MCCP",
        option::MCCP2 => "MCCP2",
        option::MXP => "MXP",
        option::ZMP => "ZMP",
        option::GMCP => "GMCP",
        _ => return None,
    })
}
