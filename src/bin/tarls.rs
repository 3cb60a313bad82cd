use std::{
    fmt,
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::PathBuf,
};

use anyhow::{bail, Context, Result};
use clap::Parser;

use iter_tar::{EntryMeta, EntryType, ParseOptions, TarStreamParser};

/// List the entries of a tar archive, or print one entry's payload
#[derive(Debug, Parser)]
#[clap(name = "tarls", version)]
pub struct App {
    /// Accept headers whose checksum does not match
    #[clap(long)]
    no_verify: bool,

    /// Fail if the archive ends without the two zero blocks
    #[clap(long)]
    require_end: bool,

    /// Write the payload of the named entry to stdout instead of listing
    #[clap(long, value_name = "NAME")]
    cat: Option<String>,

    /// Archive to read; stdin if omitted
    file: Option<PathBuf>,
}

/// One `tar tv`-style line.
struct Listing<'a>(&'a EntryMeta);

impl fmt::Display for Listing<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let meta = self.0;
        let owner = |name: &Option<Vec<u8>>, id: u64| match name {
            Some(name) if !name.is_empty() => String::from_utf8_lossy(name).into_owned(),
            _ => id.to_string(),
        };
        write!(
            fmt,
            "{}{} {}/{} {:>8} {:>11} {}",
            type_char(meta.entry_type),
            mode_string(meta.mode),
            owner(&meta.uname, meta.uid),
            owner(&meta.gname, meta.gid),
            meta.size,
            meta.mtime,
            meta.path_lossy(),
        )?;
        match (meta.entry_type, meta.link_target_lossy()) {
            (EntryType::Symlink, Some(target)) => write!(fmt, " -> {target}"),
            (EntryType::Link, Some(target)) => write!(fmt, " link to {target}"),
            _ => Ok(()),
        }
    }
}

fn type_char(entry_type: EntryType) -> char {
    match entry_type {
        EntryType::Directory => 'd',
        EntryType::Symlink => 'l',
        EntryType::Link => 'h',
        EntryType::Char => 'c',
        EntryType::Block => 'b',
        EntryType::Fifo => 'p',
        EntryType::GnuSparse => 'S',
        EntryType::Other(_) => '?',
        _ => '-',
    }
}

fn mode_string(mode: u32) -> String {
    let mut out: Vec<u8> = b"rwxrwxrwx".to_vec();
    for (i, c) in out.iter_mut().enumerate() {
        if mode & (0o400 >> i) == 0 {
            *c = b'-';
        }
    }
    let special = |bit: u32, idx: usize, set: u8, unset: u8, out: &mut Vec<u8>| {
        if mode & bit != 0 {
            out[idx] = if out[idx] == b'x' { set } else { unset };
        }
    };
    special(0o4000, 2, b's', b'S', &mut out);
    special(0o2000, 5, b's', b'S', &mut out);
    special(0o1000, 8, b't', b'T', &mut out);
    String::from_utf8_lossy(&out).into_owned()
}

fn open_input(file: Option<&PathBuf>) -> Result<Box<dyn Read>> {
    Ok(match file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {path:?}"))?,
        )),
        None => Box::new(io::stdin().lock()),
    })
}

fn list<R: Read>(parser: &mut TarStreamParser<R>, out: &mut impl Write) -> Result<()> {
    loop {
        let pos = parser.position();
        let Some(entry) = parser
            .next_entry()
            .with_context(|| format!("Reading archive after offset {pos}"))?
        else {
            return Ok(());
        };
        writeln!(out, "{}", Listing(entry.meta()))?;
    }
}

fn cat<R: Read>(parser: &mut TarStreamParser<R>, name: &str, out: &mut impl Write) -> Result<()> {
    while let Some(mut entry) = parser.next_entry().context("Reading archive")? {
        if entry.meta().name == name.as_bytes() {
            io::copy(&mut entry, out).with_context(|| format!("Reading payload of {name}"))?;
            return Ok(());
        }
    }
    bail!("{name}: not found in archive");
}

fn main() -> Result<()> {
    env_logger::init();

    let args = App::parse();
    let options = ParseOptions::new()
        .verify_checksums(!args.no_verify)
        .require_end_marker(args.require_end);
    let input = open_input(args.file.as_ref())?;
    let mut parser = TarStreamParser::with_options(input, options);

    let mut out = BufWriter::new(io::stdout().lock());
    match &args.cat {
        Some(name) => cat(&mut parser, name, &mut out)?,
        None => list(&mut parser, &mut out)?,
    }
    out.flush()?;
    Ok(())
}
