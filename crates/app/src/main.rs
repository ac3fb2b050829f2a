use std::{collections::BTreeMap, error::Error, str::FromStr};

use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use engine::{
    Currency, CurrencySupport, Engine, Expense, ExpenseSplit, NewExpense, SplitCalculator,
    SplitRequest, parse_amount,
};
use migration::{Migrator, MigratorTrait};
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use uuid::Uuid;

mod settings;

type AppResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[derive(Parser, Debug)]
#[command(name = "divvy")]
#[command(about = "Split shared expenses and track who settled what")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    /// Overrides the `database` entry of the settings.
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Acting user for capability checks.
    #[arg(long, env = "DIVVY_USER", global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Preview a split without touching the database.
    Split(SplitArgs),
    Expense(ExpenseCmd),
    /// Mark a split as settled.
    Settle {
        split_id: Uuid,
    },
    /// List the acting user's open splits in a group.
    Unsettled {
        #[arg(long)]
        group: String,
    },
    /// Net position of every member of a group.
    Balances {
        #[arg(long)]
        group: String,
    },
}

#[derive(Args, Debug)]
struct ExpenseCmd {
    #[command(subcommand)]
    command: ExpenseCommand,
}

#[derive(Subcommand, Debug)]
enum ExpenseCommand {
    Create(ExpenseCreateArgs),
    Show { expense_id: Uuid },
    Confirm { expense_id: Uuid },
    Cancel { expense_id: Uuid },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Strategy {
    Equal,
    Custom,
    Percentage,
    Share,
}

#[derive(Args, Debug)]
struct SplitArgs {
    #[arg(long)]
    amount: String,
    #[arg(long, default_value = "EUR", value_parser = parse_currency)]
    currency: Currency,
    #[arg(long, value_enum, default_value = "equal")]
    strategy: Strategy,
    /// `NAME` for equal splits, `NAME=WEIGHT` otherwise.
    #[arg(required = true)]
    participants: Vec<String>,
}

#[derive(Args, Debug)]
struct ExpenseCreateArgs {
    #[arg(long)]
    group: String,
    #[arg(long)]
    description: String,
    #[arg(long)]
    paid_by: String,
    #[arg(long)]
    category: Option<String>,
    #[command(flatten)]
    split: SplitArgs,
}

fn parse_currency(raw: &str) -> Result<Currency, String> {
    Currency::try_from(raw).map_err(|err| err.to_string())
}

/// Builds a split request from `NAME` / `NAME=WEIGHT` arguments.
fn parse_split(
    strategy: Strategy,
    participants: &[String],
    currency: Currency,
) -> Result<SplitRequest, String> {
    match strategy {
        Strategy::Equal => {
            if let Some(bad) = participants.iter().find(|p| p.contains('=')) {
                return Err(format!("equal splits take plain names, got {bad}"));
            }
            Ok(SplitRequest::equal(participants.iter().cloned()))
        }
        Strategy::Custom => {
            let amounts = parse_weights(participants)?
                .into_iter()
                .map(|(name, raw)| {
                    parse_amount(raw, currency)
                        .map(|amount| (name, amount))
                        .map_err(|err| err.to_string())
                })
                .collect::<Result<_, _>>()?;
            Ok(SplitRequest::custom(amounts))
        }
        Strategy::Percentage => {
            let percentages = parse_weights(participants)?
                .into_iter()
                .map(|(name, raw)| {
                    Decimal::from_str(raw)
                        .map(|pct| (name, pct))
                        .map_err(|_| format!("invalid percentage: {raw}"))
                })
                .collect::<Result<_, _>>()?;
            Ok(SplitRequest::percentage(percentages))
        }
        Strategy::Share => {
            let shares = parse_weights(participants)?
                .into_iter()
                .map(|(name, raw)| {
                    raw.parse::<u32>()
                        .map(|count| (name, count))
                        .map_err(|_| format!("invalid share count: {raw}"))
                })
                .collect::<Result<_, _>>()?;
            Ok(SplitRequest::share(shares))
        }
    }
}

fn parse_weights(participants: &[String]) -> Result<BTreeMap<String, &str>, String> {
    let mut weights = BTreeMap::new();
    for raw in participants {
        let (name, weight) = raw
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=WEIGHT, got {raw}"))?;
        let name = name.trim();
        if weights.insert(name.to_string(), weight.trim()).is_some() {
            return Err(format!("participant {name} given twice"));
        }
    }
    Ok(weights)
}

fn acting_user(cli_user: Option<&str>) -> AppResult<&str> {
    cli_user.ok_or_else(|| "missing --user (or DIVVY_USER)".into())
}

async fn connect_db(database_url: &str) -> AppResult<DatabaseConnection> {
    let db = sea_orm::Database::connect(database_url).await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

fn print_expense(expense: &Expense) {
    println!(
        "{} [{}] {}: {} {} paid by {}",
        expense.id,
        expense.status.as_str(),
        expense.description,
        expense.amount,
        expense.currency,
        expense.paid_by
    );
    for split in &expense.splits {
        print_split(split);
    }
}

fn print_split(split: &ExpenseSplit) {
    let state = match (&split.settled_by, split.settled_at) {
        (Some(by), Some(at)) => format!("settled by {by} at {}", at.to_rfc3339()),
        _ => "open".to_string(),
    };
    println!(
        "  {} {}: {} {} ({state})",
        split.id, split.user_id, split.share_amount, split.currency
    );
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();
    let settings = settings::Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "divvy={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let currencies: CurrencySupport = settings
        .currencies
        .enabled
        .iter()
        .map(String::as_str)
        .collect();

    if let Command::Split(args) = &cli.command {
        let request = parse_split(args.strategy, &args.participants, args.currency)?;
        let amount = parse_amount(&args.amount, args.currency)?;
        let calculator = SplitCalculator::for_currency(args.currency, &currencies)?;
        tracing::debug!(scale = calculator.scale(), "previewing split");
        let shares = calculator.compute(amount, &request)?;
        for share in shares {
            println!("{}: {} {}", share.participant_id, share.share, args.currency);
        }
        return Ok(());
    }

    let database_url = match (&cli.database_url, &settings.database) {
        (Some(url), _) => url.clone(),
        (None, Some(database)) => database.url(),
        (None, None) => String::from("sqlite:./divvy.db?mode=rwc"),
    };
    tracing::debug!(database = %database_url, "connecting");
    let db = connect_db(&database_url).await?;
    let engine = Engine::builder()
        .database(db)
        .currencies(currencies)
        .strict_settlement(settings.splits.strict_settlement)
        .allow_external_payer(settings.splits.allow_external_payer)
        .build()
        .await?;
    tracing::debug!(
        strict_settlement = engine.settlement_tracker().is_strict(),
        "engine ready"
    );
    let user = acting_user(cli.user.as_deref())?;

    match cli.command {
        Command::Split(_) => {}
        Command::Expense(ExpenseCmd { command }) => match command {
            ExpenseCommand::Create(args) => {
                let split = parse_split(
                    args.split.strategy,
                    &args.split.participants,
                    args.split.currency,
                )?;
                let amount = parse_amount(&args.split.amount, args.split.currency)?;
                let expense = engine
                    .create_expense(
                        NewExpense {
                            group_id: args.group,
                            description: args.description,
                            amount,
                            currency: args.split.currency,
                            category: args.category,
                            paid_by: args.paid_by,
                            split,
                            created_at: Utc::now(),
                        },
                        user,
                    )
                    .await?;
                print_expense(&expense);
            }
            ExpenseCommand::Show { expense_id } => {
                print_expense(&engine.expense(expense_id, user).await?);
            }
            ExpenseCommand::Confirm { expense_id } => {
                print_expense(&engine.confirm_expense(expense_id, user).await?);
            }
            ExpenseCommand::Cancel { expense_id } => {
                print_expense(&engine.cancel_expense(expense_id, user).await?);
            }
        },
        Command::Settle { split_id } => {
            let split = engine.settle_split(split_id, user, Utc::now()).await?;
            print_split(&split);
        }
        Command::Unsettled { group } => {
            for split in engine.unsettled_splits(&group, user).await? {
                print_split(&split);
            }
        }
        Command::Balances { group } => {
            let balances = engine.group_balances(&group, user).await?;
            for member in balances.members {
                println!("{}: {} {}", member.user_id, member.net, balances.currency);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn equal_split_takes_names() {
        let request = parse_split(Strategy::Equal, &args(&["A", "B"]), Currency::Eur).unwrap();
        assert_eq!(request, SplitRequest::equal(["A", "B"]));
        assert!(parse_split(Strategy::Equal, &args(&["A=1"]), Currency::Eur).is_err());
    }

    #[test]
    fn weighted_splits_parse_values() {
        let request = parse_split(Strategy::Share, &args(&["A=2", "B=1"]), Currency::Eur).unwrap();
        assert_eq!(
            request,
            SplitRequest::share(BTreeMap::from([("A".to_string(), 2), ("B".to_string(), 1)]))
        );

        let request =
            parse_split(Strategy::Custom, &args(&["A=10,50", "B=5"]), Currency::Eur).unwrap();
        assert_eq!(
            request,
            SplitRequest::custom(BTreeMap::from([
                ("A".to_string(), Decimal::new(1050, 2)),
                ("B".to_string(), Decimal::new(5, 0)),
            ]))
        );
    }

    #[test]
    fn rejects_malformed_weights() {
        assert!(parse_split(Strategy::Share, &args(&["A"]), Currency::Eur).is_err());
        assert!(parse_split(Strategy::Share, &args(&["A=x"]), Currency::Eur).is_err());
        assert!(parse_split(Strategy::Percentage, &args(&["A=50", "A=50"]), Currency::Eur).is_err());
    }

    #[test]
    fn cli_parses_expense_create() {
        let cli = Cli::try_parse_from([
            "divvy",
            "--user",
            "alice",
            "expense",
            "create",
            "--group",
            "g1",
            "--description",
            "dinner",
            "--paid-by",
            "alice",
            "--amount",
            "100.00",
            "alice",
            "bob",
        ])
        .unwrap();
        assert_eq!(cli.user.as_deref(), Some("alice"));
        let Command::Expense(ExpenseCmd {
            command: ExpenseCommand::Create(args),
        }) = cli.command
        else {
            panic!("expected expense create");
        };
        assert_eq!(args.split.strategy, Strategy::Equal);
        assert_eq!(args.split.currency, Currency::Eur);
        assert_eq!(args.split.participants, vec!["alice", "bob"]);
    }
}
