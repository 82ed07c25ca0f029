use clap::Parser;
use fixtures::{run_server, BackendState, FixtureAccount, FixtureArgs};

/// Votecaster backend fixture server
#[derive(Parser, Debug)]
#[clap(name = "backend-fixture")]
struct Cli {
    #[clap(flatten)]
    common: FixtureArgs,

    /// Redeem each sign-in ticket after it has been polled this many times
    #[arg(long, default_value = "3")]
    auto_redeem_after: u32,

    /// Additionally accept this bearer token for a fixture account
    #[arg(long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let state = BackendState::new().with_auto_redeem(args.auto_redeem_after);
    if let Some(token) = &args.token {
        state.register_account(token, FixtureAccount::sample(1001, "token-user"));
    }

    run_server(args.common, state.router()).await
}
