use std::env;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use wordfreq_rs::config::WRITE_CHUNK_SIZE;
use wordfreq_rs::{baseline, wordcount, WordCountError};

fn usage(exe: &str) -> String {
    format!("usage: {exe} [--timings] [--verify] [--no-output] <path>")
}

fn main() {
    let mut args = env::args_os();
    let exe = args
        .next()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "wordfreq-rs".into());

    let mut timings = false;
    let mut verify = false;
    let mut no_output = false;
    let mut path: Option<PathBuf> = None;

    for arg in args {
        if let Some(flag) = arg.to_str() {
            match flag {
                "--timings" => {
                    timings = true;
                    continue;
                }
                "--verify" => {
                    verify = true;
                    continue;
                }
                "--no-output" => {
                    no_output = true;
                    continue;
                }
                "--help" | "-h" => {
                    eprintln!("{}", usage(&exe));
                    process::exit(0);
                }
                _ if flag.starts_with("--") => {
                    eprintln!("unknown flag: {flag}");
                    eprintln!("{}", usage(&exe));
                    process::exit(1);
                }
                _ => {}
            }
        }
        if path.is_some() {
            eprintln!("{}", usage(&exe));
            process::exit(1);
        }
        path = Some(PathBuf::from(arg));
    }

    let Some(path) = path else {
        eprintln!("{}", usage(&exe));
        process::exit(1);
    };

    let counts = match wordcount(&path) {
        Ok(counts) => counts,
        Err(err) => {
            eprintln!("{exe}: {err}");
            let code = match err {
                WordCountError::Map(_) => 2,
                _ => 1,
            };
            process::exit(code);
        }
    };

    if !no_output {
        if let Err(err) = render(&counts) {
            if err.kind() != io::ErrorKind::BrokenPipe {
                eprintln!("{exe}: write failed: {err}");
                process::exit(1);
            }
        }
    }

    if verify {
        match baseline::count_tokens(&path) {
            Ok(expected) => {
                if let Some(what) = mismatch(&counts, &expected) {
                    eprintln!("{exe}: verification failed: {what}");
                    process::exit(1);
                }
                eprintln!("verified: {} distinct tokens", counts.len());
            }
            Err(err) => {
                eprintln!("{exe}: verification read failed: {err}");
                process::exit(1);
            }
        }
    }

    if timings {
        if counts.hugepage_fallback() {
            eprintln!("hugepage reservation failed, using base pages");
        }
        eprintln!("{}", counts.timings());
        for run in counts.count_runs() {
            eprintln!(
                "there are {} tokens that occur {} times",
                run.n_strings, run.count
            );
        }
    }
}

fn render(counts: &wordfreq_rs::WordCounts) -> io::Result<()> {
    let stdout = io::stdout().lock();
    let mut out = BufWriter::with_capacity(WRITE_CHUNK_SIZE, stdout);
    for (count, token) in counts.iter() {
        out.write_all(token)?;
        writeln!(out, "\t{count}")?;
    }
    out.flush()
}

fn mismatch(
    counts: &wordfreq_rs::WordCounts,
    expected: &[(u32, Vec<u8>)],
) -> Option<String> {
    if counts.len() != expected.len() {
        return Some(format!(
            "{} distinct tokens, expected {}",
            counts.len(),
            expected.len()
        ));
    }
    for (i, (got, want)) in counts.iter().zip(expected.iter()).enumerate() {
        if got.0 != want.0 || got.1 != want.1.as_slice() {
            return Some(format!("first difference at entry {i}"));
        }
    }
    None
}
