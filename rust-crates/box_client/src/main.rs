use alloy_primitives::Address;
use alloy_provider::{
    Provider,
    ProviderBuilder,
};
use clap::{
    ArgGroup,
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use deployments::{
    DeploymentEnv,
    DeploymentRecord,
    DeploymentStore,
};
use mystery_box::{
    app::AppController,
    catalog::{
        CatalogView,
        format_price,
    },
    chain::{
        ChainReadClient,
        ContractInfo,
    },
    rpc::RpcContractReader,
    session::WalletSession,
    wallets::{
        KeystoreWallet,
        Network,
        find_keystore,
        resolve_keystore_dir,
        unlock_keystore,
    },
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    sync::OnceLock,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};
use url::Url;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(
    name = "mystery-box",
    about = "Mint, open and track mystery box NFTs",
    version,
    group(
        ArgGroup::new("network")
            .args(["sepolia", "local"])
            .required(true)
    )
)]
struct Args {
    /// Use the Sepolia deployment
    #[arg(long)]
    sepolia: bool,

    /// Use a local node (chain id 31337)
    #[arg(long)]
    local: bool,

    /// Override RPC URL
    #[arg(long)]
    rpc_url: Option<Url>,

    /// Contract address (defaults to the recorded deployment)
    #[arg(long)]
    contract: Option<Address>,

    /// Keystore name to sign with
    #[arg(long)]
    keystore: Option<String>,

    /// Override keystore directory (defaults to ~/.foundry/keystores)
    #[arg(long)]
    keystore_dir: Option<String>,

    /// Approve wallet prompts without asking
    #[arg(short, long)]
    yes: bool,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show contract info and check the deployment
    Info,
    /// List the boxes owned by the wallet account
    Boxes,
    /// Mint a new box at the current price
    Mint,
    /// Open an owned box and reveal its rarity
    Open { token_id: u64 },
    /// Stay connected and follow wallet changes until Ctrl-C
    Watch,
    /// Record the contract as the deployment for the selected network
    Register {
        #[arg(long)]
        block: Option<u64>,
    },
}

fn init_tracing(log_dir: &Path) -> Result<()> {
    let appender = rolling::daily(log_dir, "mystery-box.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    LOG_GUARD
        .set(guard)
        .map_err(|_| eyre!("log writer already initialized"))?;
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!("installing tracing subscriber: {e}"))
}

async fn handle_interupt() {
    let res = tokio::signal::ctrl_c().await;
    match res {
        Ok(_) => {
            tracing::info!("Received interrupt, exiting");
        }
        Err(_) => {
            tracing::warn!("Received interrupt error, exiting anyway");
        }
    }
}

fn contract_address(
    args: &Args,
    record: Option<&DeploymentRecord>,
    env: DeploymentEnv,
) -> Result<Address> {
    if let Some(address) = args.contract {
        return Ok(address);
    }
    let record = record.ok_or_else(|| {
        eyre!("No deployment recorded for {env}; pass --contract or run `register`")
    })?;
    record.contract_address.parse().map_err(|e| {
        eyre!(
            "Failed to parse recorded contract address '{}': {e}",
            record.contract_address
        )
    })
}

fn open_wallet(
    args: &Args,
    env: DeploymentEnv,
    rpc_url: &Url,
) -> Result<Option<KeystoreWallet>> {
    let Some(name) = args.keystore.as_deref() else {
        return Ok(None);
    };
    let dir = resolve_keystore_dir(args.keystore_dir.as_deref())
        .wrap_err("resolving keystore directory")?;
    let descriptor = find_keystore(&dir, name).wrap_err("locating requested keystore")?;
    let signer = unlock_keystore(&descriptor)?;
    let initial = Network::new(env.chain_id(), env.to_string(), rpc_url.clone());
    Ok(Some(KeystoreWallet::new(
        signer,
        Network::known(env, rpc_url),
        initial,
        args.yes,
    )))
}

fn print_info(address: Address, info: &ContractInfo) {
    println!("{} ({}) at {address}", info.name, info.symbol);
    println!("  Price: {} ETH", format_price(info.unit_price));
    let supply = if info.is_unlimited() {
        "unlimited".to_string()
    } else {
        info.max_supply.to_string()
    };
    println!("  Minted: {} / {supply}", info.total_minted);
    if info.mint_paused {
        println!("  Minting is paused");
    }
}

fn print_catalog(view: &CatalogView) {
    match view.session.account {
        Some(account) => println!("Account {account} ({:?})", view.session.status),
        None => println!("Not connected"),
    }
    if let Some(panel) = &view.mint_panel {
        println!(
            "{} ({}): {} ETH, minted {} / {}{}",
            panel.name,
            panel.symbol,
            panel.price_eth,
            panel.minted,
            panel.supply_label,
            if panel.sold_out { ", sold out" } else { "" }
        );
    }
    println!(
        "Boxes: {} opened, {} unopened",
        view.opened_count, view.unopened_count
    );
    for row in &view.boxes {
        let variant = row
            .variant_id
            .map(|variant| format!(" variant {variant}"))
            .unwrap_or_default();
        let opened = row
            .opened_at
            .as_deref()
            .map(|at| format!(", opened {at}"))
            .unwrap_or_default();
        println!(
            "  #{:<6} {:<10}{variant} minted {}{opened}",
            row.token_id, row.label, row.minted_at
        );
    }
    let odds: Vec<String> = view
        .odds
        .iter()
        .map(|(rarity, percent)| format!("{rarity} {percent}%"))
        .collect();
    println!("Odds: {}", odds.join(", "));
    if let Some(error) = &view.last_error {
        println!("Last error: {error}");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    color_eyre::install()?;
    init_tracing(&args.log_dir)?;
    deployments::ensure_structure().map_err(|e| eyre!(e))?;

    let env = if args.sepolia {
        DeploymentEnv::Sepolia
    } else {
        DeploymentEnv::Local
    };
    let store = DeploymentStore::new(env).map_err(|e| eyre!(e))?;
    let record = store.load_or_builtin().map_err(|e| eyre!(e))?;
    let rpc_url = match &args.rpc_url {
        Some(url) => url.clone(),
        None => Url::parse(env.default_rpc_url()).wrap_err("parsing default RPC URL")?,
    };
    let address = contract_address(&args, record.as_ref(), env)?;
    let required_chain_id = record.as_ref().map_or(env.chain_id(), |r| r.chain_id);
    tracing::info!(%env, %address, url = %rpc_url, "starting mystery-box client");

    let provider = ProviderBuilder::new().connect_http(rpc_url.clone()).erased();
    let chain = ChainReadClient::new(RpcContractReader::new(address, provider));

    match args.command {
        Command::Info => {
            let code = chain.ensure_deployed().await?;
            if let Some(record) = record.as_ref()
                && !record.is_compatible_with_code(&code)
            {
                tracing::warn!(%address, "deployed code does not match the recorded hash");
                println!("Warning: deployed code differs from the recorded deployment");
            }
            let info = chain.contract_info().await?;
            print_info(address, &info);
            if let Some(explorer) = record.as_ref().and_then(|r| r.explorer_url.as_deref()) {
                println!("  Explorer: {explorer}/address/{address}");
            }
            return Ok(());
        }
        Command::Register { block } => {
            let code = chain.ensure_deployed().await?;
            let record = deployments::record_deployment(
                &store,
                address.to_string(),
                rpc_url.as_str(),
                &code,
                block,
            )
            .map_err(|e| eyre!(e))?;
            println!(
                "Recorded {} on {} at {}",
                record.contract_address, record.network_name, record.deployed_at
            );
            return Ok(());
        }
        _ => {}
    }

    let wallet = open_wallet(&args, env, &rpc_url)?;
    let app = AppController::new(WalletSession::new(wallet, required_chain_id), chain);
    app.start().await.wrap_err("connecting wallet")?;

    match args.command {
        Command::Boxes => print_catalog(&app.catalog()),
        Command::Mint => {
            let settlement = app.mint().await.wrap_err("minting box")?;
            match settlement.token_id {
                Some(token_id) => println!("Minted box #{token_id}"),
                None => println!("Mint confirmed in {}", settlement.tx_hash),
            }
            print_catalog(&app.catalog());
        }
        Command::Open { token_id } => {
            let settlement = app.open(token_id).await.wrap_err("opening box")?;
            match settlement.opened {
                Some(opened) => println!(
                    "Box #{token_id} revealed {} (variant {})",
                    opened.rarity, opened.variant_id
                ),
                None => println!("Box #{token_id} opened in {}", settlement.tx_hash),
            }
            print_catalog(&app.catalog());
        }
        Command::Watch => {
            let mut subscription = app.subscribe()?;
            print_catalog(&app.catalog());
            let interrupt = handle_interupt();
            tokio::pin!(interrupt);
            loop {
                tokio::select! {
                    notification = subscription.next() => {
                        let Some(notification) = notification else {
                            break;
                        };
                        let event = app.handle_notification(notification).await;
                        println!("{}", app.status());
                        tracing::debug!(?event, "wallet notification handled");
                        print_catalog(&app.catalog());
                    }
                    _ = &mut interrupt => break,
                }
            }
            subscription.cancel();
        }
        Command::Info | Command::Register { .. } => {}
    }
    Ok(())
}
