//! CLI configuration.
//!
//! Grounded on `original_source/main.c`'s `parse_cmd_line` (`getopt_long`
//! flag set), translated to the teacher's `clap`-derive style. Flags with
//! no meaning outside the container-runtime/websocket pieces this crate
//! drops (`--connect-timeout`, `--send-timeout`, `-s/--system`) are not
//! carried forward; see SPEC_FULL.md §6.

use std::net::IpAddr;

use clap::Parser;

/// Bridge a PTY to a VT102 console exposed over RFB (VNC).
#[derive(Parser, Debug, Clone)]
#[command(name = "tty-rfb-bridge", version, about)]
pub struct Args {
    /// Address to listen on.
    #[arg(short, long, default_value = "0.0.0.0")]
    pub listen: IpAddr,

    /// TCP port to bind. Ignored if `--auto-port` is set.
    #[arg(short, long, default_value_t = 5900)]
    pub port: u16,

    /// Probe a free port in [--min-port, --max-port] instead of binding
    /// `--port` directly.
    #[arg(long, default_value_t = false)]
    pub auto_port: bool,

    #[arg(long, default_value_t = 5900)]
    pub min_port: u16,

    #[arg(long, default_value_t = 5999)]
    pub max_port: u16,

    /// Console width in character cells.
    #[arg(long, default_value_t = 80)]
    pub width: u16,

    /// Console height in character cells.
    #[arg(long, default_value_t = 24)]
    pub height: u16,

    /// Path to a TLS certificate for the RFB listener.
    #[arg(long)]
    pub sslcert: Option<std::path::PathBuf>,

    /// Path to the TLS private key matching `--sslcert`.
    #[arg(long)]
    pub sslkey: Option<std::path::PathBuf>,

    /// Read a VNC password from stdin (bounded at 4096 bytes, matching
    /// `MAX_PASSWD` in the original console's command-line parser).
    #[arg(long, default_value_t = false)]
    pub passwd: bool,

    /// Debug verbosity level, 0-3.
    #[arg(short, long, default_value_t = 0)]
    pub debug: u8,

    /// Increase log verbosity (stacks with `--debug`).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Wrap the cursor from the last row back to the first at the scroll
    /// region boundary instead of scrolling.
    #[arg(long, default_value_t = false)]
    pub wrap_bottom_to_top: bool,

    /// Command to run as the PTY's controlling process. Defaults to
    /// `$SHELL`.
    #[arg(long)]
    pub shell: Option<String>,
}

pub const MAX_PASSWD: usize = 4096;

/// The resolved runtime configuration passed to `Session::new` and the RFB
/// listener setup. Distinct from `Args` so embedders that don't go through
/// the CLI can build one directly.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: IpAddr,
    pub port: u16,
    pub auto_port: bool,
    pub min_port: u16,
    pub max_port: u16,
    pub width: u16,
    pub height: u16,
    pub sslcert: Option<std::path::PathBuf>,
    pub sslkey: Option<std::path::PathBuf>,
    pub password: Option<Vec<u8>>,
    pub wrap_bottom_to_top: bool,
    pub shell: Option<String>,
    /// RFB event-pump poll timeout, in microseconds. Defaults to the
    /// original's 100ms (`select_timeout` in `original_source/console.h`).
    pub select_timeout_micros: u64,
}

impl Config {
    pub fn from_args(args: Args, password: Option<Vec<u8>>) -> Self {
        Config {
            listen: args.listen,
            port: args.port,
            auto_port: args.auto_port,
            min_port: args.min_port,
            max_port: args.max_port,
            width: args.width,
            height: args.height,
            sslcert: args.sslcert,
            sslkey: args.sslkey,
            password,
            wrap_bottom_to_top: args.wrap_bottom_to_top,
            shell: args.shell,
            select_timeout_micros: 100_000,
        }
    }
}

/// Read a password from stdin, bounded at `MAX_PASSWD` bytes, matching the
/// original's `-passwd` stdin-read behavior.
pub fn read_password_from_stdin() -> std::io::Result<Vec<u8>> {
    use std::io::Read;
    let mut buf = Vec::with_capacity(256);
    std::io::stdin().take(MAX_PASSWD as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_args() {
        let args = Args::parse_from(["tty-rfb-bridge"]);
        assert_eq!(args.port, 5900);
        assert_eq!(args.width, 80);
        assert_eq!(args.height, 24);
        assert!(!args.auto_port);
    }

    #[test]
    fn parses_overridden_dimensions() {
        let args = Args::parse_from(["tty-rfb-bridge", "--width", "132", "--height", "43"]);
        assert_eq!(args.width, 132);
        assert_eq!(args.height, 43);
    }

    #[test]
    fn config_carries_wrap_flag_through() {
        let args = Args::parse_from(["tty-rfb-bridge", "--wrap-bottom-to-top"]);
        let cfg = Config::from_args(args, None);
        assert!(cfg.wrap_bottom_to_top);
    }
}
