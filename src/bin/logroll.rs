use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use time::OffsetDateTime;

use logroll::{ReplayReader, Roller, RollerConfig};

const BINARY_BUF_SIZE: usize = 32 * 1024;

/// Append stdin to a size-rotated, gzip-archived logfile, or dump the
/// full history of one.
#[derive(Parser)]
#[command(name = "logroll")]
struct Cli {
    /// Path to the logfile
    #[arg(long, required_unless_present = "dump")]
    logfile: Option<PathBuf>,

    /// Max log size before rotation (in MB)
    #[arg(long, required_unless_present = "dump")]
    max_log_size: Option<u64>,

    /// Max total size of log plus archives before deletion (in MB)
    #[arg(long, required_unless_present = "dump")]
    max_total_size: Option<u64>,

    /// Tee input to stdout
    #[arg(long)]
    tee_stdout: bool,

    /// Tee output to stderr
    #[arg(long)]
    tee_stderr: bool,

    /// Copy raw binary blocks instead of lines
    #[arg(long)]
    binary: bool,

    /// Prefix each line with the current UTC time in this format
    /// (e.g. "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]")
    #[arg(long)]
    time_format: Option<String>,

    /// Dump the full history of the given logfile to stdout and exit
    #[arg(long, conflicts_with_all = ["logfile", "max_log_size", "max_total_size"])]
    dump: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if let Some(path) = &cli.dump {
        return dump(path, cli.binary, cli.tee_stderr);
    }

    let (logfile, max_log, max_total) = match (&cli.logfile, cli.max_log_size, cli.max_total_size)
    {
        (Some(logfile), Some(max_log), Some(max_total)) => (logfile.clone(), max_log, max_total),
        _ => bail!("--logfile, --max-log-size and --max-total-size are required"),
    };

    let mut config = RollerConfig::new(logfile, max_log, max_total);
    if let Some(fmt) = &cli.time_format {
        let format = time::format_description::parse_owned::<2>(fmt)
            .context("invalid --time-format")?;
        config.format = Some(Box::new(move |msg, buf| {
            let stamp = OffsetDateTime::now_utc().format(&format).unwrap_or_default();
            buf.extend_from_slice(stamp.as_bytes());
            buf.extend_from_slice(b" : ");
            buf.extend_from_slice(msg);
            stamp.len() + 3
        }));
    }

    let mut roller = Roller::new(config)?;
    let result = if cli.binary {
        run_binary(&mut roller, cli.tee_stdout, cli.tee_stderr)
    } else {
        run_text(&mut roller, cli.tee_stdout, cli.tee_stderr)
    };
    let closed = roller.close();

    result?;
    closed?;
    Ok(())
}

fn run_text(roller: &mut Roller, tee_stdout: bool, tee_stderr: bool) -> anyhow::Result<()> {
    let mut input = io::stdin().lock();
    let mut line = Vec::with_capacity(4096);
    loop {
        line.clear();
        if input.read_until(b'\n', &mut line)? == 0 {
            return Ok(());
        }
        // Normalize endings: a CRLF becomes a bare newline, and an
        // unterminated final line gets one.
        trim_line_ending(&mut line);
        line.push(b'\n');
        roller.append(&line)?;
        if tee_stdout {
            io::stdout().write_all(&line)?;
        }
        if tee_stderr {
            io::stderr().write_all(&line)?;
        }
    }
}

fn run_binary(roller: &mut Roller, tee_stdout: bool, tee_stderr: bool) -> anyhow::Result<()> {
    let mut input = io::stdin().lock();
    let mut buf = vec![0u8; BINARY_BUF_SIZE];
    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        roller.append(&buf[..n])?;
        if tee_stdout {
            io::stdout().write_all(&buf[..n])?;
        }
        if tee_stderr {
            io::stderr().write_all(&buf[..n])?;
        }
    }
}

fn dump(path: &Path, binary: bool, tee_stderr: bool) -> anyhow::Result<()> {
    let mut reader = ReplayReader::new(path)?;
    let result = if binary {
        dump_binary(&mut reader, tee_stderr)
    } else {
        dump_text(&mut reader, tee_stderr)
    };
    result.with_context(|| format!("dumping {}", path.display()))
}

fn dump_binary(reader: &mut ReplayReader, tee_stderr: bool) -> anyhow::Result<()> {
    let mut buf = vec![0u8; BINARY_BUF_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        io::stdout().write_all(&buf[..n])?;
        if tee_stderr {
            io::stderr().write_all(&buf[..n])?;
        }
    }
}

fn dump_text(reader: &mut ReplayReader, tee_stderr: bool) -> anyhow::Result<()> {
    let mut input = BufReader::new(reader);
    let mut line = Vec::with_capacity(4096);
    loop {
        line.clear();
        if input.read_until(b'\n', &mut line)? == 0 {
            return Ok(());
        }
        trim_line_ending(&mut line);
        line.push(b'\n');
        io::stdout().write_all(&line)?;
        if tee_stderr {
            io::stderr().write_all(&line)?;
        }
    }
}

/// Strip a trailing LF, and a CR left in front of it, so both endings
/// can be re-terminated uniformly.
fn trim_line_ending(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
}
