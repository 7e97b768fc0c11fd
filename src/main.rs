//! fx - command line front-end for the f(x) position SDK
//!
//! Every subcommand prints its outcome as JSON on stdout. Logs go to stderr,
//! filtered with RUST_LOG (default `fx_sdk=info`).
//!
//! Run with: cargo run -- increase --market eth --side long --token wstETH \
//!     --amount 1000000000000000000 --leverage 3 --user 0x...

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::Result;
use console::style;
use fx_sdk::aggregator::RouteType;
use fx_sdk::config::SdkConfig;
use fx_sdk::pool::{Market, PositionType};
use fx_sdk::sdk::{parse_address, parse_amount, parse_position_id, parse_token_input};
use fx_sdk::types::{
    AdjustLeverageRequest, DepositAndMintRequest, IncreasePositionRequest, ReducePositionRequest,
    RepayAndWithdrawRequest,
};
use fx_sdk::FxSdk;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fx", version, about = "Leveraged positions on f(x) protocol")]
struct Cli {
    /// TOML config file; the environment (.env) is used when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pool snapshot: capacity, debt-ratio bounds, fees and prices
    Pool(MarketArgs),
    /// Positions held by a user
    Positions {
        #[command(flatten)]
        market: MarketArgs,
        #[arg(long)]
        user: String,
    },
    /// Open a position or add to one
    Increase {
        #[command(flatten)]
        position: PositionArgs,
        /// Input token symbol or address
        #[arg(long)]
        token: String,
        /// Amount in base units
        #[arg(long)]
        amount: String,
        #[arg(long)]
        leverage: f64,
        #[command(flatten)]
        routing: RoutingArgs,
    },
    /// Reduce or close a position
    Reduce {
        #[command(flatten)]
        position: PositionArgs,
        /// Output token symbol or address
        #[arg(long)]
        token: String,
        /// Collateral (long) or debt (short) in base units
        #[arg(long, default_value = "0")]
        amount: String,
        #[arg(long)]
        close: bool,
        #[command(flatten)]
        routing: RoutingArgs,
    },
    /// Move an existing position to a new leverage
    Adjust {
        #[command(flatten)]
        position: PositionArgs,
        #[arg(long)]
        leverage: f64,
        #[command(flatten)]
        routing: RoutingArgs,
    },
    /// Deposit collateral and mint fxUSD (long only)
    DepositMint {
        #[arg(long, value_parser = parse_market)]
        market: Market,
        #[arg(long, default_value = "0")]
        id: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        token: String,
        #[arg(long)]
        deposit: String,
        #[arg(long)]
        mint: String,
    },
    /// Repay fxUSD and withdraw collateral (long only)
    RepayWithdraw {
        #[arg(long, value_parser = parse_market)]
        market: Market,
        #[arg(long)]
        id: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        token: String,
        #[arg(long)]
        repay: String,
        #[arg(long)]
        withdraw: String,
    },
}

#[derive(Args)]
struct MarketArgs {
    /// ETH or BTC
    #[arg(long, value_parser = parse_market)]
    market: Market,
    /// long or short
    #[arg(long, value_parser = parse_side)]
    side: PositionType,
}

#[derive(Args)]
struct PositionArgs {
    #[command(flatten)]
    market: MarketArgs,
    /// Position id, 0 for a new position
    #[arg(long, default_value = "0")]
    id: String,
    #[arg(long)]
    user: String,
}

#[derive(Args)]
struct RoutingArgs {
    /// Slippage in percent
    #[arg(long, default_value_t = 0.5)]
    slippage: f64,
    /// Restrict to these providers (Velora, Odos, FxRoute, "FxRoute 2")
    #[arg(long = "route", value_parser = parse_route)]
    routes: Vec<RouteType>,
}

fn parse_market(input: &str) -> std::result::Result<Market, String> {
    input.parse().map_err(|e: fx_sdk::SdkError| e.to_string())
}

fn parse_side(input: &str) -> std::result::Result<PositionType, String> {
    input.parse().map_err(|e: fx_sdk::SdkError| e.to_string())
}

fn parse_route(input: &str) -> std::result::Result<RouteType, String> {
    input.parse().map_err(|e: fx_sdk::SdkError| e.to_string())
}

fn print_banner() {
    eprintln!();
    eprintln!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    eprintln!("{}", style(" 📐 fx - f(x) protocol leveraged positions").cyan().bold());
    eprintln!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    eprintln!();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<SdkConfig> {
    let config = match path {
        Some(path) => SdkConfig::from_file(path)?,
        None => SdkConfig::from_env()?,
    };
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file");
        return Err(e);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("fx_sdk=info".parse()?))
        .init();

    let cli = Cli::parse();
    print_banner();

    let config = load_config(cli.config.as_ref())?;
    info!("Chain {} via {}", config.chain_id, config.rpc_url);
    let sdk = FxSdk::new(&config).await?;

    match cli.command {
        Command::Pool(market) => {
            let pool = sdk.get_pool_info(market.market, market.side).await?;
            print_json(&pool)?;
        }
        Command::Positions { market, user } => {
            let user = parse_address(&user, "User address is not a valid address")?;
            let positions = sdk.get_positions(market.market, market.side, user).await?;
            print_json(&positions)?;
        }
        Command::Increase { position, token, amount, leverage, routing } => {
            let request = IncreasePositionRequest {
                market: position.market.market,
                position_type: position.market.side,
                position_id: parse_position_id(&position.id)?,
                user: parse_address(&position.user, "User address is not a valid address")?,
                input_token: parse_token_input(&token, "From token address is not a valid address")?,
                amount: parse_amount(&amount, "From amount must be greater than 0")?,
                leverage,
                slippage: routing.slippage,
                targets: routing.routes,
            };
            print_json(&sdk.increase_position(&request).await?)?;
        }
        Command::Reduce { position, token, amount, close, routing } => {
            let request = ReducePositionRequest {
                market: position.market.market,
                position_type: position.market.side,
                position_id: parse_position_id(&position.id)?,
                user: parse_address(&position.user, "User address is not a valid address")?,
                output_token: parse_token_input(&token, "From token address is not a valid address")?,
                amount: parse_amount(&amount, "From amount must be greater than 0")?,
                slippage: routing.slippage,
                targets: routing.routes,
                is_close: close,
            };
            print_json(&sdk.reduce_position(&request).await?)?;
        }
        Command::Adjust { position, leverage, routing } => {
            let request = AdjustLeverageRequest {
                market: position.market.market,
                position_type: position.market.side,
                position_id: parse_position_id(&position.id)?,
                user: parse_address(&position.user, "User address is not a valid address")?,
                leverage,
                slippage: routing.slippage,
                targets: routing.routes,
            };
            print_json(&sdk.adjust_position_leverage(&request).await?)?;
        }
        Command::DepositMint { market, id, user, token, deposit, mint } => {
            let request = DepositAndMintRequest {
                market,
                position_id: parse_position_id(&id)?,
                user: parse_address(&user, "User address is not a valid address")?,
                deposit_token: parse_token_input(&token, "Deposit token address is not a valid address")?,
                deposit_amount: parse_amount(&deposit, "Deposit amount must be greater than or equal to 0")?,
                mint_amount: parse_amount(&mint, "Mint amount must be greater than or equal to 0")?,
            };
            print_json(&sdk.deposit_and_mint(&request).await?)?;
        }
        Command::RepayWithdraw { market, id, user, token, repay, withdraw } => {
            let request = RepayAndWithdrawRequest {
                market,
                position_id: parse_position_id(&id)?,
                user: parse_address(&user, "User address is not a valid address")?,
                repay_amount: parse_amount(&repay, "Repay amount must be greater than or equal to 0")?,
                withdraw_amount: parse_amount(&withdraw, "Withdraw amount must be greater than or equal to 0")?,
                withdraw_token: parse_token_input(&token, "Withdraw token address is not a valid address")?,
            };
            print_json(&sdk.repay_and_withdraw(&request).await?)?;
        }
    }

    Ok(())
}
