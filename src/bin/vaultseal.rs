use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use tracing::info;
use zeroize::Zeroizing;

use vaultseal::api::{self, KeyLabel, ModulePath, Pin, SlotId, MODULE_PATH_ENV};
use vaultseal::{EncryptedContainer, TAG_LEN};

#[derive(Parser, Debug)]
#[command(name = "vaultseal")]
#[command(about = "Encrypt files with a key pair held in a PKCS#11 token", version)]
pub struct Cli {
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// PKCS#11 module to load. Auto-detected when omitted
    #[arg(long, global = true, env = MODULE_PATH_ENV)]
    pub module: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct TokenArgs {
    /// Slot holding the token
    #[arg(long)]
    pub slot: u64,

    /// User PIN
    #[arg(long, env = "VAULTSEAL_PIN", hide_env_values = true)]
    pub pin: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List slots that hold a token
    Tokens,

    /// List the private key labels on a token
    Keys {
        #[command(flatten)]
        token: TokenArgs,
    },

    /// Encrypt a file for a key pair on the token
    Encrypt {
        #[command(flatten)]
        token: TokenArgs,

        /// Label shared by the key pair
        #[arg(long)]
        label: String,

        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output: PathBuf,
    },

    /// Decrypt a file sealed for a key pair on the token
    Decrypt {
        #[command(flatten)]
        token: TokenArgs,

        /// Label shared by the key pair
        #[arg(long)]
        label: String,

        #[arg(long)]
        input: PathBuf,

        /// Write the plaintext here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show the header of a sealed file without touching a token
    Inspect {
        #[arg(long)]
        input: PathBuf,
    },
}

fn module_path(explicit: Option<PathBuf>) -> anyhow::Result<ModulePath> {
    api::resolve_module_path(explicit)
        .with_context(|| format!("no PKCS#11 module: pass --module or set {}", MODULE_PATH_ENV))
}

fn credentials(token: TokenArgs) -> anyhow::Result<(SlotId, Pin)> {
    let pin = Pin::new(token.pin).context("invalid PIN")?;
    Ok((SlotId::new(token.slot), pin))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity.tracing_level_filter())
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Tokens => {
            let path = module_path(cli.module)?;
            let tokens = api::list_tokens(&path).context("failed to list tokens")?;
            if tokens.is_empty() {
                info!("No tokens found");
            }
            for token in tokens {
                println!("{}", token);
            }
        }

        Commands::Keys { token } => {
            let path = module_path(cli.module)?;
            let (slot, pin) = credentials(token)?;
            let labels =
                api::list_key_labels(&path, slot, &pin).context("failed to list key labels")?;
            for label in labels {
                println!("{}", label);
            }
        }

        Commands::Encrypt {
            token,
            label,
            input,
            output,
        } => {
            let path = module_path(cli.module)?;
            let (slot, pin) = credentials(token)?;
            let label = KeyLabel::new(label).context("invalid key label")?;
            api::seal_file(&path, slot, &pin, &label, &input, &output)
                .with_context(|| format!("failed to encrypt {}", input.display()))?;
        }

        Commands::Decrypt {
            token,
            label,
            input,
            output,
        } => {
            let path = module_path(cli.module)?;
            let (slot, pin) = credentials(token)?;
            let label = KeyLabel::new(label).context("invalid key label")?;
            let plaintext = Zeroizing::new(
                api::unseal_file(&path, slot, &pin, &label, &input)
                    .with_context(|| format!("failed to decrypt {}", input.display()))?,
            );

            match output {
                Some(output) => fs::write(&output, plaintext.as_slice())
                    .with_context(|| format!("failed to write {}", output.display()))?,
                None => {
                    let mut stdout = io::stdout().lock();
                    stdout.write_all(&plaintext)?;
                    stdout.flush()?;
                }
            }
        }

        Commands::Inspect { input } => {
            let bytes =
                fs::read(&input).with_context(|| format!("failed to read {}", input.display()))?;
            let container = EncryptedContainer::from_bytes(&bytes)
                .with_context(|| format!("{} is not a sealed file", input.display()))?;

            println!("wrapped key: {} bytes", container.wrapped_key_len());
            println!("nonce: {}", hex::encode(container.nonce()));
            println!("payload: {} bytes", container.ciphertext().len() - TAG_LEN);
        }
    }

    Ok(())
}
