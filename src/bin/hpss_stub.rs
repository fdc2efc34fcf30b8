//! Deterministic stand-in for the hsi executable, used by the
//! integration tests. Speaks the sentinel-framed line protocol over
//! stdin/stdout and serves a small canned archive tree.
//!
//! Behavior toggles:
//! - `HPSS_STUB_EXIT_AFTER=<n>`: exit after answering n commands, to
//!   exercise dead-session detection and reconnect.
//! - `HPSS_STUB_TRACE_PATH`: append every received line to this file.

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

const ROOT: &str = "/hpss/home/stub";
const ID_LINE: &str = "uid=4242(stub) gid=4242(stub) groups=4242(stub)";
const TIME: &str = "Jan 02 03:04:05 2024";

struct Trace {
    file: Option<std::fs::File>,
}

impl Trace {
    fn from_env() -> Self {
        let path = std::env::var_os("HPSS_STUB_TRACE_PATH")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        let file = path.and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
        Self { file }
    }

    fn log(&mut self, line: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let _ = writeln!(file, "{line}");
        let _ = file.flush();
    }
}

struct Archive {
    dirs: HashSet<String>,
    /// file path -> size in bytes
    files: HashMap<String, u64>,
    annotations: HashMap<String, String>,
}

impl Archive {
    fn new() -> Self {
        let mut dirs = HashSet::new();
        for dir in ["archive", "archive/data", "archive/data/sub"] {
            dirs.insert(dir.to_string());
        }
        let mut files = HashMap::new();
        files.insert("archive/data/report.txt".to_string(), 1024);
        files.insert("archive/data/notes.md".to_string(), 64);
        files.insert("archive/data/corrupt.bin".to_string(), 512);
        Self {
            dirs,
            files,
            annotations: HashMap::new(),
        }
    }

    fn children(&self, dir: &str) -> Vec<(String, bool)> {
        let prefix = format!("{dir}/");
        let mut out = Vec::new();
        for d in &self.dirs {
            if let Some(rest) = d.strip_prefix(&prefix) {
                if !rest.contains('/') {
                    out.push((d.clone(), true));
                }
            }
        }
        for f in self.files.keys() {
            if let Some(rest) = f.strip_prefix(&prefix) {
                if !rest.contains('/') {
                    out.push((f.clone(), false));
                }
            }
        }
        out.sort();
        out
    }
}

fn main() {
    // One-shot invocations carry their command on the command line and
    // never enter the session loop: `... pwd` (reachability probe) and
    // `-q ... get -c on - : path` (stream transfer).
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.last().is_some_and(|a| a == "pwd") {
        println!("pwd0: {ROOT}");
        return;
    }
    if args.iter().any(|a| a == "get") {
        if let Some(path) = args.last() {
            print!("stub stream payload for {path}");
        }
        return;
    }

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = BufReader::new(stdin.lock());
    let mut writer = BufWriter::new(stdout.lock());

    let mut trace = Trace::from_env();
    let exit_after: Option<u64> = std::env::var("HPSS_STUB_EXIT_AFTER")
        .ok()
        .and_then(|v| v.trim().parse().ok());

    let mut archive = Archive::new();
    let mut answered: u64 = 0;

    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let request = line.trim_end();
        trace.log(request);

        if request.starts_with("pwd;") {
            // Handshake probe: five lines, the fifth becomes the sentinel.
            let _ = writeln!(writer, "pwd0: {ROOT}");
            let _ = writeln!(writer, "lpwd0: /tmp");
            let _ = writeln!(writer, "glob is on");
            let _ = writeln!(writer, "idletime: timeout reset disabled");
            let _ = writeln!(writer, "{ID_LINE}");
            let _ = writer.flush();
            continue;
        }

        let command = request.strip_suffix("; id").unwrap_or(request);
        handle(&mut writer, &mut archive, command);
        let _ = writeln!(writer, "{ID_LINE}");
        let _ = writer.flush();

        answered += 1;
        if exit_after.is_some_and(|n| answered >= n) {
            std::process::exit(0);
        }
    }
}

fn handle(writer: &mut impl Write, archive: &mut Archive, command: &str) {
    let tokens: Vec<&str> = command.split_whitespace().collect();
    let Some(&name) = tokens.first() else {
        return;
    };

    match name {
        "ls" => handle_ls(writer, archive, &tokens),
        "mkdir" => {
            if let Some(path) = tokens.last() {
                archive.dirs.insert(trim_root(path));
            }
        }
        "rmdir" => {
            if let Some(path) = tokens.last() {
                archive.dirs.remove(&trim_root(path));
            }
        }
        "delete" => {
            if let Some(path) = tokens.last() {
                archive.files.remove(&trim_root(path));
            }
        }
        "mv" => {
            let args: Vec<&str> = tokens[1..].iter().filter(|t| **t != "-f").copied().collect();
            if let [old, new] = args[..] {
                let (old, new) = (trim_root(old), trim_root(new));
                if let Some(size) = archive.files.remove(&old) {
                    archive.files.insert(new, size);
                } else if archive.dirs.remove(&old) {
                    archive.dirs.insert(new);
                }
            }
        }
        "annotate" => {
            // `annotate -A "text with spaces" path`
            if tokens.len() >= 4 {
                let path = tokens[tokens.len() - 1];
                let text = tokens[2..tokens.len() - 1]
                    .join(" ")
                    .trim_matches('"')
                    .to_string();
                archive.annotations.insert(trim_root(path), text);
            }
        }
        "du" => {
            if let Some(path) = tokens.last() {
                let _ = writeln!(writer, "du0: usage for {path}");
                let _ = writeln!(writer, "-------");
                let _ = writeln!(writer, "12345 bytes used in {path}");
            }
        }
        "hashlist" => {
            if let Some(path) = tokens.last() {
                let trimmed = trim_root(path);
                if trimmed.ends_with("notes.md") {
                    let _ = writeln!(writer, "(none)  md5 {path}");
                } else if archive.files.contains_key(&trimmed) {
                    let _ = writeln!(writer, "9e107d9d372bb6826bd81d3542a419d6 md5 {path}");
                }
            }
        }
        "hashverify" => {
            if let Some(path) = tokens.last() {
                if trim_root(path).ends_with("corrupt.bin") {
                    let _ = writeln!(writer, "{path}: FAILED");
                } else {
                    let _ = writeln!(writer, "{path}: OK");
                }
            }
        }
        // Transfers and the remaining mutations are acknowledged
        // silently, like the real tool in pipe mode.
        "get" | "put" | "lcd" | "chmod" | "ln" | "stage" | "purge" | "migrate"
        | "hashcreate" => {}
        _ => {
            let _ = writeln!(writer, "*** hsi: unknown command: {name}");
        }
    }
}

fn handle_ls(writer: &mut impl Write, archive: &Archive, tokens: &[&str]) {
    if tokens.len() < 2 {
        return;
    }
    let Some(path) = tokens.last().filter(|t| !t.starts_with('-')) else {
        return;
    };
    let flags = tokens[1..tokens.len() - 1].concat();
    let trimmed = trim_root(path);

    if trimmed.contains("forbidden") {
        let _ = writeln!(writer, "*** ls: {path}: HPSS_EACCES (access denied)");
        return;
    }

    let listing_dir = flags.contains('O');
    let storage = flags.contains('X');
    let annotations = flags.contains('A') && !flags.contains('a');

    if annotations {
        if let Some(text) = archive.annotations.get(&trimmed) {
            let _ = writeln!(writer, "{path}:");
            let _ = writeln!(writer, "          Annotation: {text}");
        } else {
            let _ = writeln!(writer, "{path}:");
        }
        return;
    }

    if listing_dir {
        if archive.dirs.contains(&trimmed) {
            for (child, is_dir) in archive.children(&trimmed) {
                emit_row(writer, archive, &child, is_dir, storage);
            }
        }
        return;
    }

    if archive.dirs.contains(&trimmed) {
        emit_row(writer, archive, &trimmed, true, false);
    } else if archive.files.contains_key(&trimmed) {
        emit_row(writer, archive, &trimmed, false, storage);
    } else {
        let _ = writeln!(writer, "*** ls: {path}: HPSS_ENOENT");
    }
}

fn emit_row(writer: &mut impl Write, archive: &Archive, path: &str, is_dir: bool, storage: bool) {
    let full = format!("{ROOT}/{path}");
    if is_dir {
        let _ = writeln!(writer, "drwxr-xr-x    2 stub   stub       512 {TIME} {full}");
        return;
    }

    let size = archive.files.get(path).copied().unwrap_or(0);
    let _ = writeln!(
        writer,
        "-rw-r--r--    1 stub   stub   4001 DISK  {size} {TIME} {full}"
    );
    if storage {
        let _ = writeln!(writer, "Storage  VV  Stripe");
        let _ = writeln!(writer, "  Level  Count Width  Bytes at Level");
        let _ = writeln!(writer, "-------------------------------------");
        let _ = writeln!(writer, "  0 (disk)   1    1   {size}");
        let _ = writeln!(writer, "  1 (tape)   1    1   {size}");
        let _ = writeln!(writer, "      Pos:  3+0  PV List: XV004800");
        if path.ends_with("report.txt") {
            let _ = writeln!(writer, "  2 (tape)   1    1   {size}");
            let _ = writeln!(writer, "      Pos:  7+0  PV List: XV009901");
        } else {
            let _ = writeln!(writer, "  2 (tape)   1    1   (no data at this level)");
        }
        let _ = writeln!(writer);
    }
}

/// Commands carry subtree-relative paths; the canned tree is keyed the
/// same way, so only a leading root prefix from display paths is shed.
fn trim_root(path: &str) -> String {
    let path = path.strip_prefix(ROOT).unwrap_or(path);
    path.trim_start_matches('/').to_string()
}
