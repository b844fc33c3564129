use clap::{Parser, Subcommand};
use kopesha::application::dashboard::Dashboard;
use kopesha::application::flow::PaymentFlow;
use kopesha::config::{ApiConfig, PollConfig};
use kopesha::domain::loan::{LoanApplication, LoanRecord, LoanType};
use kopesha::domain::offer::{catalog, find_offer};
use kopesha::domain::payment::PaymentState;
use kopesha::domain::ports::{LoanRecords, LoanRecordsArc, PaymentGatewayArc};
use kopesha::infrastructure::in_memory::{
    GatewayScript, InMemoryLoanRecords, InMemoryPaymentGateway,
};
use kopesha::interfaces::csv::record_writer::RecordWriter;
use miette::{IntoDiagnostic, Result, bail};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::io;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Use scripted in-memory adapters instead of the loans API
    #[arg(long, global = true)]
    offline: bool,

    #[command(flatten)]
    api: ApiConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the loan offer catalog as CSV
    Offers,
    /// Submit a loan eligibility application
    Apply {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        id_number: String,
        /// One of emergency, topup, rental, car
        #[arg(long)]
        loan_type: LoanType,
    },
    /// Pay the verification fee for an offer and wait for confirmation
    Pay {
        #[arg(long)]
        tracking_id: String,
        /// Phone number that receives the M-Pesa prompt
        #[arg(long)]
        phone: String,
        /// Offer id from `kopesha offers`
        #[arg(long)]
        offer: u8,

        #[command(flatten)]
        poll: PollConfig,
    },
    /// Inspect and manage loan applications
    Loans {
        #[command(subcommand)]
        command: LoansCommand,
    },
}

#[derive(Subcommand)]
enum LoansCommand {
    /// Print every application as CSV
    List,
    /// Print dashboard totals over paid applications
    Summary,
    /// Delete an application by tracking id
    Delete { tracking_id: String },
}

struct Adapters {
    gateway: PaymentGatewayArc,
    records: LoanRecordsArc,
}

impl Adapters {
    fn remote(api: &ApiConfig) -> Result<Self> {
        Ok(Self {
            gateway: api.payment_gateway().into_diagnostic()?,
            records: api.loan_records().into_diagnostic()?,
        })
    }

    /// A gateway that confirms on the second status check and a few seeded records.
    fn offline() -> Self {
        let script = GatewayScript::default()
            .queue_status("PENDING")
            .queue_status("PAID");
        let demo = |id: u64, name: &str, loan: Decimal, fee: Decimal, status: &str| LoanRecord {
            id: Some(id),
            tracking_id: format!("TRK-{id:06}"),
            name: name.to_string(),
            phone: "0712345678".to_string(),
            id_number: format!("{:08}", 30_000_000 + id),
            loan_amount: Some(loan),
            verification_fee: Some(fee),
            status: status.to_string(),
        };
        Self {
            gateway: Arc::new(InMemoryPaymentGateway::new(script)),
            records: Arc::new(InMemoryLoanRecords::with_records(vec![
                demo(1, "Jane Wanjiku", dec!(5000), dec!(250), "PAID"),
                demo(2, "Peter Otieno", dec!(20000), dec!(500), "PENDING"),
                demo(3, "Mary Akinyi", dec!(50000), dec!(1000), "PAID"),
            ])),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let adapters = if cli.offline {
        Adapters::offline()
    } else {
        Adapters::remote(&cli.api)?
    };

    match cli.command {
        Command::Offers => {
            let stdout = io::stdout();
            let mut writer = RecordWriter::new(stdout.lock());
            writer.write_offers(&catalog()).into_diagnostic()?;
        }
        Command::Apply {
            name,
            phone,
            id_number,
            loan_type,
        } => {
            let application = LoanApplication {
                name,
                phone,
                id_number,
                loan_type,
            };
            let record = adapters.records.apply(&application).await.into_diagnostic()?;
            println!("Application submitted. Tracking id: {}", record.tracking_id);
        }
        Command::Pay {
            tracking_id,
            phone,
            offer,
            poll,
        } => pay(adapters.gateway, &tracking_id, &phone, offer, &poll).await?,
        Command::Loans { command } => {
            let mut dashboard = Dashboard::load(adapters.records).await.into_diagnostic()?;
            match command {
                LoansCommand::List => {
                    let stdout = io::stdout();
                    let mut writer = RecordWriter::new(stdout.lock());
                    writer.write_loans(dashboard.loans()).into_diagnostic()?;
                }
                LoansCommand::Summary => println!("{}", dashboard.summary()),
                LoansCommand::Delete { tracking_id } => {
                    dashboard.delete(&tracking_id).await.into_diagnostic()?;
                    println!("Deleted {tracking_id}");
                }
            }
        }
    }

    Ok(())
}

async fn pay(
    gateway: PaymentGatewayArc,
    tracking_id: &str,
    phone: &str,
    offer_id: u8,
    poll: &PollConfig,
) -> Result<()> {
    let offer = find_offer(offer_id);
    let flow = PaymentFlow::new(gateway, poll.schedule().into_diagnostic()?, poll.auto_clear());
    let mut updates = flow.subscribe();

    flow.initiate(tracking_id, phone, offer.as_ref())
        .await
        .into_diagnostic()?;
    if let Some(offer) = &offer {
        println!(
            "STK push sent. Enter your M-Pesa PIN to pay {} for a {} loan.",
            offer.verification_fee, offer.amount
        );
    }

    let mut shown = None;
    let outcome = flow.wait_for_outcome();
    tokio::pin!(outcome);
    let outcome = loop {
        tokio::select! {
            result = &mut outcome => break result,
            Ok(()) = updates.changed() => {
                let display = updates.borrow_and_update().display();
                if let Some(state) = display
                    && shown != Some(state)
                {
                    println!("Payment status: {state}");
                    shown = Some(state);
                }
            }
            _ = tokio::signal::ctrl_c() => flow.cancel(),
        }
    };

    match outcome.into_diagnostic()? {
        PaymentState::Success => {
            if shown != Some(PaymentState::Success) {
                println!("Payment status: {}", PaymentState::Success);
            }
            println!("Verification fee received. Your loan is being processed.");
            Ok(())
        }
        PaymentState::Cancelled => bail!("Payment was cancelled on the phone"),
        PaymentState::Failed => bail!("Payment failed. Please try again"),
        state => bail!("Stopped waiting for confirmation while payment was {state}"),
    }
}
