//! Losia CLI - operator tools for the order-fulfillment core.
//!
//! # Usage
//!
//! ```bash
//! # Generate order codes
//! losia order-code --prefix LOSIA --count 3
//!
//! # Which fallback image a product gets
//! losia demo-image prd-linen-dress --index 1
//!
//! # Price a cart snapshot, optionally with a voucher
//! losia price cart.json --voucher voucher.json
//!
//! # Resolve an eco-impact profile
//! losia eco-impact --group Dress
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use losia_core::{Money, OrderCodeGenerator, PricingPolicy, order_code::DEFAULT_PREFIX};

mod commands;

#[derive(Parser)]
#[command(name = "losia")]
#[command(author, version, about = "Losia operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate order codes
    OrderCode {
        /// Code prefix
        #[arg(short, long, default_value = DEFAULT_PREFIX)]
        prefix: String,

        /// How many codes to generate
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },
    /// Show the demo image assigned to an ID
    DemoImage {
        /// Product or article ID
        id: String,

        /// Position in a gallery
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        index: i64,

        /// Comma-separated image pool instead of the built-in one
        #[arg(long, value_delimiter = ',')]
        pool: Option<Vec<String>>,
    },
    /// Price a cart JSON file
    Price {
        /// Cart snapshot file
        cart: PathBuf,

        /// Voucher rule file
        #[arg(short, long)]
        voucher: Option<PathBuf>,

        /// Free-shipping threshold
        #[arg(long, default_value_t = 500_000)]
        threshold: i64,

        /// Shipping fee below the threshold
        #[arg(long, default_value_t = 30_000)]
        shipping_fee: i64,
    },
    /// Resolve an eco-impact profile
    EcoImpact {
        /// Explicit eco-impact group label
        #[arg(short, long)]
        group: Option<String>,

        /// Parent category of the product type
        #[arg(short, long)]
        type_name: Option<String>,

        /// Profile table JSON file instead of the built-in one
        #[arg(long)]
        table: Option<PathBuf>,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "losia_cli=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(output) => {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = writeln!(stdout, "{output}") {
                tracing::error!("Failed to write output: {e}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!("Command failed: {e}");
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<String, commands::CommandError> {
    match cli.command {
        Commands::OrderCode { prefix, count } => {
            commands::order_code::run(&OrderCodeGenerator::default(), &prefix, count)
        }
        Commands::DemoImage { id, index, pool } => commands::demo_image::run(&id, index, pool),
        Commands::Price {
            cart,
            voucher,
            threshold,
            shipping_fee,
        } => {
            if threshold < 0 || shipping_fee < 0 {
                return Err(commands::CommandError::InvalidArgument(
                    "amounts must not be negative".to_string(),
                ));
            }
            let policy = PricingPolicy {
                free_shipping_threshold: Money::from_units(threshold),
                shipping_fee: Money::from_units(shipping_fee),
            };
            commands::price::run_now(&cart, voucher.as_deref(), &policy)
        }
        Commands::EcoImpact {
            group,
            type_name,
            table,
        } => commands::eco_impact::run(group.as_deref(), type_name.as_deref(), table.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }
}
