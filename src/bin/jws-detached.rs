use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jws_detached::{
    header::validate_header, Certificate, Ps256SigningKey, SignedDocument, SignedEnvelope,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jws-detached")]
#[command(about = "Sign and verify JSON payloads with detached PS256 JWS tokens")]
struct Cli {
    /// Log verification details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign a JSON payload and write a signed envelope
    Sign {
        /// RSA private key (PKCS#8 or PKCS#1 PEM)
        #[arg(long)]
        key: PathBuf,

        /// Signer certificate (PEM or DER), embedded as x5c
        #[arg(long)]
        cert: PathBuf,

        /// JSON payload file
        #[arg(long)]
        payload: PathBuf,

        /// Password for an encrypted private key
        #[arg(long, env = "JWS_KEY_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Write the envelope here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print only the detached token
        #[arg(long)]
        token_only: bool,
    },
    /// Verify a signed envelope
    Verify {
        /// Path to the envelope JSON file
        envelope: PathBuf,

        /// Trust this certificate instead of the embedded x5c
        #[arg(long)]
        cert: Option<PathBuf>,

        /// Output result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the unverified header of an envelope or bare token
    Inspect {
        /// Envelope JSON file or file containing a compact token
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Sign {
            key,
            cert,
            payload,
            password,
            out,
            token_only,
        } => sign_command(
            &key,
            &cert,
            &payload,
            password.as_deref(),
            out.as_deref(),
            token_only,
        ),
        Commands::Verify {
            envelope,
            cert,
            json,
        } => verify_command(&envelope, cert.as_deref(), json),
        Commands::Inspect { input } => inspect_command(&input),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn sign_command(
    key_path: &Path,
    cert_path: &Path,
    payload_path: &Path,
    password: Option<&str>,
    out: Option<&Path>,
    token_only: bool,
) -> Result<()> {
    let key = Ps256SigningKey::from_file(key_path, password.map(str::as_bytes))
        .context("Failed to load private key")?;
    let cert = Certificate::from_file(cert_path).context("Failed to load certificate")?;

    let payload = std::fs::read_to_string(payload_path)
        .with_context(|| format!("Failed to read payload {}", payload_path.display()))?;
    let payload: Value = serde_json::from_str(&payload).context("Payload is not valid JSON")?;

    let envelope =
        SignedEnvelope::seal(&key, cert.der(), payload).context("Failed to sign payload")?;

    let output = if token_only {
        envelope.signature.clone()
    } else {
        envelope.to_json_pretty()?
    };

    match out {
        Some(path) => {
            std::fs::write(path, format!("{}\n", output))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("[OK] Signed as {}", cert.subject());
            eprintln!("     Wrote {}", path.display());
        }
        None => println!("{}", output),
    }

    Ok(())
}

fn verify_command(envelope_path: &Path, cert_path: Option<&Path>, json_output: bool) -> Result<()> {
    let envelope = SignedEnvelope::from_file(envelope_path).context("Failed to parse envelope")?;
    let cert = cert_path
        .map(Certificate::from_file)
        .transpose()
        .context("Failed to load certificate")?;

    let report = envelope.verify_report(cert.as_ref());

    if json_output {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize result")?;
        println!("{}", json);
    } else {
        println!("Verifying envelope: {}", envelope_path.display());
        println!("  Version:    {}", report.version);
        match &report.subject {
            Some(subject) => println!("  Signer:     {}", subject),
            None => println!("  Signer:     N/A"),
        }
        if let Some(thumbprint) = &report.sha256_thumbprint {
            println!("  SHA-256:    {}", thumbprint);
        }

        println!();
        if report.valid {
            println!("[OK] Signature verified");
        } else {
            println!("[FAILED] Signature verification");
        }
    }

    if report.valid {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Verification failed"))
    }
}

fn inspect_command(path: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let document = SignedDocument::parse(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    if let SignedDocument::Envelope(envelope) = &document {
        println!("[OK] Envelope parsed (version {})", envelope.version);
    }

    let header = document
        .token()
        .and_then(|token| token.header())
        .context("Failed to decode JWS header")?;
    println!("Header (unverified):");
    println!("{}", serde_json::to_string_pretty(&header)?);

    match validate_header(&header) {
        Ok(()) => println!("[OK] Detached header checks passed"),
        Err(e) => println!("[FAILED] {} ({})", e, e.code()),
    }

    match header.x5c_certificate() {
        Ok(cert) => {
            println!();
            println!("x5c certificate:");
            println!("  Subject:    {}", cert.subject());
            println!("  Issuer:     {}", cert.issuer());
            println!("  Serial:     {}", cert.serial());
            println!("  SHA-256:    {}", cert.sha256_thumbprint());
            println!("  x5t#S256:   {}", cert.x5t_s256());
        }
        Err(e) => println!("[FAILED] x5c certificate: {}", e),
    }

    Ok(())
}
