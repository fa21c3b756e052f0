//! Purpose: Hold top-level CLI command dispatch for `recfile`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every command emits exactly one JSON document on success.
//! Invariants: Files are opened read-only; readers are closed before returning.

use super::*;

use clap::CommandFactory;
use recfile::api::{FlatOptions, FlatReader, RecordReader};

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "recfile", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_json(json!({
                "name": "recfile",
                "version": env!("CARGO_PKG_VERSION"),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Header { file } => {
            let mut reader = RecordReader::open(&file)?;
            emit_json(header_json(&reader, &file));
            reader.close();
            Ok(RunOutcome::ok())
        }
        Command::Tokens {
            file,
            count,
            decode,
        } => {
            let mut reader = RecordReader::open(&file)?;
            let tokens = reader.peek_tokens(count)?;
            let alphabet = reader
                .format()
                .map(|format| format.alphabet())
                .unwrap_or(Alphabet::Current);
            let tokens = tokens
                .iter()
                .map(|token| {
                    if decode {
                        json!({
                            "token": token,
                            "value": alphabet.decode(token.as_bytes()),
                        })
                    } else {
                        json!({ "token": token })
                    }
                })
                .collect::<Vec<_>>();
            let mut value = header_json(&reader, &file);
            if let Value::Object(map) = &mut value {
                map.insert("tokens".to_string(), Value::Array(tokens));
            }
            emit_json(value);
            reader.close();
            Ok(RunOutcome::ok())
        }
        Command::Encode { value, alphabet } => {
            let alphabet = Alphabet::from(alphabet);
            emit_json(json!({
                "value": value,
                "alphabet": alphabet,
                "token": alphabet.encode(value),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Decode { token, alphabet } => {
            if token.is_empty() || token.bytes().any(|byte| byte.is_ascii_whitespace()) {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("token must be non-empty and contain no whitespace")
                    .with_token(token.as_bytes()));
            }
            let alphabet = Alphabet::from(alphabet);
            emit_json(json!({
                "token": token,
                "alphabet": alphabet,
                "value": alphabet.decode(token.as_bytes()),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Kv { file, delimiter } => {
            let options = flat_options(delimiter)?;
            let mut reader = FlatReader::open(&file, options)?;
            let mut records = Vec::new();
            while let Some(record) = reader.next_record()? {
                records.push(record);
            }
            reader.close();
            emit_json(json!({
                "path": file.display().to_string(),
                "records": records,
            }));
            Ok(RunOutcome::ok())
        }
    }
}

fn header_json(reader: &RecordReader, file: &std::path::Path) -> Value {
    json!({
        "path": file.display().to_string(),
        "format": reader.format(),
        "version": reader.version(),
        "compression": reader.compression(),
    })
}

fn flat_options(delimiter: char) -> Result<FlatOptions, Error> {
    if !delimiter.is_ascii() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("delimiter {delimiter:?} is not a single ASCII character"))
            .with_hint("Pick an ASCII delimiter such as ':' or '='."));
    }
    FlatOptions::default().with_delimiter(delimiter as u8)
}
