mod config;

use msgdecode_rs::io::{LimitedWriter, WriteLimitExceededError};
use msgdecode_rs::ole::Ole;
use msgdecode_rs::*;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::prelude::*;

fn usage(me: &str) -> ! {
    eprintln!("Usage:");
    eprintln!("{me} <file.msg>...");
    eprintln!("  Decodes each <file.msg>, extracts bodies and attachments into the");
    eprintln!("  configured output path and prints a JSON description to stdout");
    std::process::exit(1);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args[1].starts_with('-') {
        usage(args.first().map(|s| s.as_str()).unwrap_or("msgdecode"));
    }
    let config = config::Config::new()?;
    let mut failures = 0usize;
    for fname in &args[1..] {
        match process_file(fname, &config) {
            Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
            Err(e) => {
                error!("Failed to process {fname}: {e}");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        std::process::exit(2);
    }
    Ok(())
}

/// Extraction limits and counters for a single input file
struct Budget {
    remaining_size: u64,
    remaining_children: u32,
    rtf_bodies: u32,
    limits_reached: bool,
}

impl Budget {
    fn new(config: &config::Config) -> Self {
        Self {
            remaining_size: config.max_processed_size,
            remaining_children: config.max_children,
            rtf_bodies: 0,
            limits_reached: false,
        }
    }
}

#[derive(Serialize)]
struct Part {
    path: Option<String>,
    size: usize,
    symbols: Vec<&'static str>,
}

fn save_part(data: &[u8], config: &config::Config, budget: &mut Budget) -> Result<Part, io::Error> {
    if budget.remaining_children == 0 {
        budget.limits_reached = true;
        return Ok(Part {
            path: None,
            size: data.len(),
            symbols: vec!["LIMITS_REACHED"],
        });
    }
    budget.remaining_children -= 1;
    let tempf = tempfile::NamedTempFile::new_in(&config.output_path)?;
    debug!("Dumping part to {:?}", tempf.path());
    let mut w = LimitedWriter::new(
        tempf,
        budget.remaining_size.min(config.max_child_output_size),
    );
    match io::copy(&mut &data[..], &mut w) {
        Ok(len) => {
            budget.remaining_size -= len;
            let path = w
                .into_inner()
                .into_temp_path()
                .keep()
                .map_err(|e| io::Error::other(format!("Failed to preserve temporary file: {e}")))?
                .into_os_string()
                .into_string()
                .map_err(|s| io::Error::other(format!("Failed to convert OsString {s:?} to String")))?;
            Ok(Part {
                path: Some(path),
                size: data.len(),
                symbols: Vec::new(),
            })
        }
        Err(e) if WriteLimitExceededError::is_cause_of(&e) => {
            if budget.remaining_size < config.max_child_output_size {
                budget.limits_reached = true;
            }
            Ok(Part {
                path: None,
                size: data.len(),
                symbols: vec!["TOOBIG"],
            })
        }
        Err(e) => Err(e),
    }
}

#[derive(Serialize)]
struct RecipientMetadata {
    kind: Option<&'static str>,
    name: Option<String>,
    email: Option<String>,
}

impl<E: ContainerEntry> From<&Recipient<E>> for RecipientMetadata {
    fn from(rcpt: &Recipient<E>) -> Self {
        Self {
            kind: rcpt
                .kind()
                .filter(|k| *k != RecipientType::Unknown)
                .map(|k| k.as_str()),
            name: rcpt.display_name().map(|s| s.to_string()),
            email: rcpt.email().map(|s| s.to_string()),
        }
    }
}

#[derive(Serialize)]
struct AttachmentMetadata {
    name: Option<String>,
    mime_type: String,
    hidden: bool,
    part: Option<Part>,
    message: Option<Box<MessageMetadata>>,
}

#[derive(Serialize)]
struct MessageMetadata {
    headers: Vec<(String, String)>,
    transport_headers: Vec<(String, String)>,
    recipients: Vec<RecipientMetadata>,
    text_body: Option<Part>,
    html_body: Option<Part>,
    rtf_body: Option<Part>,
    rtf_name: Option<String>,
    attachments: Vec<AttachmentMetadata>,
}

const TRANSPORT_HEADERS: &[&str] = &[
    "bcc",
    "cc",
    "envelope-to",
    "from",
    "in-reply-to",
    "message-id",
    "reply-to",
    "return-path",
    "subject",
    "to",
];

fn describe_message<E: ContainerEntry>(
    msg: &Message<E>,
    config: &config::Config,
    budget: &mut Budget,
) -> Result<MessageMetadata, io::Error> {
    let headers = msg
        .summary_headers()
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    let mut transport_headers = Vec::new();
    if let Some(hdrs) = msg.transport_headers() {
        for (k, v) in &hdrs {
            let klc = k.to_lowercase();
            if TRANSPORT_HEADERS.contains(&klc.as_str()) {
                transport_headers.push((klc, v.into_owned()));
            }
        }
    }
    let recipients = msg.recipients.iter().map(|r| r.into()).collect();
    let text_body = msg
        .plain_body()
        .map(|body| save_part(body.as_bytes(), config, budget))
        .transpose()?;
    let html_body = msg
        .html_body()
        .map(|body| save_part(body.as_bytes(), config, budget))
        .transpose()?;
    let (rtf_body, rtf_name) = match msg.rtf_compressed() {
        Some(rtf) => {
            budget.rtf_bodies += 1;
            (
                Some(save_part(rtf, config, budget)?),
                Some(format!("messagebody_{}.rtf", budget.rtf_bodies)),
            )
        }
        None => (None, None),
    };

    let mut attachments = Vec::with_capacity(msg.attachments.len());
    for attm in msg.attachments.iter() {
        let name = attm.filename().map(|s| s.to_string());
        let mime_type = attm.mime_type().to_string();
        debug!("Processing attachment {:?} ({})", name, mime_type);
        let (part, message) = match attm.content() {
            AttachmentContent::Binary(data) => (Some(save_part(data, config, budget)?), None),
            AttachmentContent::Embedded(inner) => (
                None,
                Some(Box::new(describe_message(inner, config, budget)?)),
            ),
            AttachmentContent::Missing => (None, None),
        };
        attachments.push(AttachmentMetadata {
            name,
            mime_type,
            hidden: attm.hidden(),
            part,
            message,
        });
    }

    Ok(MessageMetadata {
        headers,
        transport_headers,
        recipients,
        text_body,
        html_body,
        rtf_body,
        rtf_name,
        attachments,
    })
}

#[derive(Serialize)]
struct FileReport {
    file: String,
    anomalies: Vec<String>,
    message: MessageMetadata,
    diagnostics: Vec<String>,
    limits_reached: bool,
}

#[instrument(level = "error", skip(config))]
fn process_file(fname: &str, config: &config::Config) -> Result<FileReport, io::Error> {
    info!("Parsing {fname}");
    let ole = Ole::new(BufReader::new(File::open(fname)?))?;
    for anomaly in ole.anomalies() {
        warn!("Ole anomaly: {anomaly}");
    }
    let decoder = PropertyDecoder::new(
        &ole,
        DecoderOptions {
            max_depth: config.max_depth,
        },
    );
    let mut diag = Diagnostics::new();
    let msg = Message::load(&decoder, &mut diag)?;
    let mut budget = Budget::new(config);
    let message = describe_message(&msg, config, &mut budget)?;
    if !diag.is_empty() {
        info!("{} decode events", diag.len());
    }
    Ok(FileReport {
        file: fname.to_string(),
        anomalies: ole.anomalies().to_vec(),
        message,
        diagnostics: diag.events().iter().map(|e| e.to_string()).collect(),
        limits_reached: budget.limits_reached,
    })
}
