use crate::infra::{parse_category, parse_date, InMemoryNotifier};
use chrono::{Datelike, Duration, Local, NaiveDate};
use clap::Args;
use fleet_compliance::error::AppError;
use fleet_compliance::obligations::alerts::{
    AlertFilter, AlertScanner, AlertStore, Contact, DeliveryQueue, DriverContact, DriverId,
    MemoryAlertStore, ScanReport, ShutdownSignal, StaticAssetDirectory,
};
use fleet_compliance::obligations::archive::{EvidenceUpload, FsDocumentArchive};
use fleet_compliance::obligations::config::ComplianceConfig;
use fleet_compliance::obligations::domain::{AssetId, ObligationCategory, RuleParams};
use fleet_compliance::obligations::renewal::{
    RenewalError, RenewalRequest, RenewalService, RenewalSubmission,
};
use fleet_compliance::obligations::rules::{tax, ColorBand, RuleEngine, RuleError};
use fleet_compliance::obligations::store::{MemoryObligationStore, PageRequest};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DueArgs {
    /// Obligation category (emissions, insurance, registration_tax, plate_registration)
    #[arg(long, value_parser = parse_category)]
    pub(crate) category: ObligationCategory,
    /// Verification or payment date the rule evaluates from (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) reference: Option<NaiveDate>,
    /// Emissions exemption code as printed on the hologram ("00", "0", "1", "2")
    #[arg(long)]
    pub(crate) exemption: Option<String>,
    /// Emissions color band; derived from --plate when omitted
    #[arg(long)]
    pub(crate) color: Option<String>,
    /// License plate, used to derive the emissions color band
    #[arg(long)]
    pub(crate) plate: Option<String>,
    /// Expiry date for insurance and plate registration (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) vigencia: Option<NaiveDate>,
    /// Calendar year settled by a registration-tax payment
    #[arg(long)]
    pub(crate) period: Option<i32>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Date the walkthrough treats as today (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Evidence file attached to the renewal; its type is guessed from the extension
    #[arg(long)]
    pub(crate) evidence: Option<PathBuf>,
    /// Directory for the evidence archive (defaults to a fresh temp directory)
    #[arg(long)]
    pub(crate) archive_root: Option<PathBuf>,
}

pub(crate) fn run_due(args: DueArgs) -> Result<(), AppError> {
    let reference = args.reference.unwrap_or_else(|| Local::now().date_naive());
    let params = due_params(&args, reference)?;
    let due = RuleEngine::new().compute_next_due(args.category, reference, &params)?;

    println!("{} ({})", args.category.label(), args.category.slug());
    println!("- reference date {reference}");
    println!("- next due {due} ({} days)", (due - reference).num_days());
    if let RuleParams::RegistrationTax { .. } = params {
        println!("- paid on {reference}: {}", tax::tier_on(reference).message());
    }
    Ok(())
}

fn due_params(args: &DueArgs, reference: NaiveDate) -> Result<RuleParams, RuleError> {
    let missing = |flag: &str| RuleError::InvalidParameters {
        category: args.category,
        reason: format!("--{flag} is required"),
    };

    match args.category {
        ObligationCategory::Emissions => {
            let exemption = args.exemption.clone().ok_or_else(|| missing("exemption"))?;
            let color_band = match (&args.color, &args.plate) {
                (Some(color), _) => color.clone(),
                (None, Some(plate)) => ColorBand::from_plate(plate)
                    .map(|band| band.label().to_string())
                    .unwrap_or_default(),
                (None, None) => String::new(),
            };
            Ok(RuleParams::Emissions {
                exemption,
                color_band,
            })
        }
        ObligationCategory::Insurance => Ok(RuleParams::Insurance {
            vigencia: args.vigencia.ok_or_else(|| missing("vigencia"))?,
        }),
        ObligationCategory::PlateRegistration => Ok(RuleParams::PlateRegistration {
            vigencia: args.vigencia.ok_or_else(|| missing("vigencia"))?,
        }),
        ObligationCategory::RegistrationTax => Ok(RuleParams::RegistrationTax {
            period: args.period.unwrap_or_else(|| reference.year()),
        }),
    }
}

type DemoService = RenewalService<MemoryObligationStore, FsDocumentArchive, MemoryAlertStore>;

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        today,
        evidence,
        archive_root,
    } = args;

    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let archive_root = archive_root.unwrap_or_else(|| {
        std::env::temp_dir().join(format!("fleet-compliance-demo-{}", std::process::id()))
    });
    std::fs::create_dir_all(&archive_root)?;

    let unit = AssetId("demo-unit-01".to_string());
    let config = ComplianceConfig::default();
    let store = Arc::new(MemoryObligationStore::new());
    let alerts = Arc::new(MemoryAlertStore::new());
    let notifier = Arc::new(InMemoryNotifier::default());
    let (delivery, mut worker) = DeliveryQueue::channel(64, notifier.clone());

    let directory = StaticAssetDirectory::new(vec![Contact::new(
        "Fleet administration",
        Some("fleet@example.com"),
    )])
    .assign(
        unit.clone(),
        DriverContact {
            driver_id: DriverId("drv-demo".to_string()),
            contact: Contact::new("Demo driver", None),
        },
        today - Duration::days(90),
        None,
    );

    let service: DemoService = RenewalService::new(
        store.clone(),
        Arc::new(FsDocumentArchive::new(&archive_root)),
        alerts.clone(),
        config.clone(),
    )
    .with_confirmations(delivery.clone());
    let scanner = AlertScanner::new(store, alerts.clone(), Arc::new(directory), config)
        .with_delivery(delivery.clone());
    let shutdown = ShutdownSignal::new();

    println!("Fleet compliance demo for {unit} (today {today})");
    println!("Evidence archive: {}", archive_root.display());

    let expiring = today + Duration::days(20);
    let policy = |coverage_start: NaiveDate, vigencia: NaiveDate| RenewalSubmission::Insurance {
        insurer: "Seguros Demo".to_string(),
        policy_type: "Amplia".to_string(),
        policy_number: format!("POL-{}", vigencia.format("%Y%m%d")),
        sum_insured: 380_000.0,
        premium: 10_900.0,
        coverage_start,
        vigencia,
        landline: None,
        mobile: None,
    };
    let request = |submission, evidence| RenewalRequest {
        asset_id: unit.clone(),
        acting_user: "demo.admin".to_string(),
        submission,
        evidence,
    };

    service.submit_renewal(
        request(policy(expiring - Duration::days(365), expiring), None),
        today,
    )?;
    service.submit_renewal(
        request(
            RenewalSubmission::PlateRegistration {
                plate: "DMO-4417".to_string(),
                folio: "PL-DEMO".to_string(),
                issued_on: today - Duration::days(30),
                vigencia: today + Duration::days(3 * 365),
                payment_amount: 920.0,
            },
            None,
        ),
        today,
    )?;
    println!("\nRegistered insurance (due {expiring}) and plate registration");

    let report = scanner.scan(today, &shutdown)?;
    print_scan("First scan", &report);
    for alert in alerts.list(&AlertFilter::default().pending())? {
        println!(
            "  - {} {} -> {} (due {}): {}",
            alert.id, alert.category, alert.audience, alert.due_date, alert.message
        );
    }

    let upload = match evidence {
        Some(path) => {
            let bytes = std::fs::read(&path)?;
            let content_type = mime_guess::from_path(&path).first_or_octet_stream();
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned());
            let upload = EvidenceUpload::new(bytes, content_type);
            Some(match name {
                Some(name) => upload.named(name),
                None => upload,
            })
        }
        None => None,
    };

    let renewed_until = expiring + Duration::days(365);
    match service.submit_renewal(request(policy(expiring, renewed_until), upload), today) {
        Ok(receipt) => {
            println!(
                "\nRenewed {} as {} (due {}, replaced {})",
                receipt.key,
                receipt.record_id,
                receipt.effective_date,
                receipt
                    .previous
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "nothing".to_string())
            );
            println!("  Completed {} pending alert(s)", receipt.resolved_alerts.len());
            if let Some(stored) = &receipt.evidence {
                println!("  Evidence stored at {}", stored.location);
            }
        }
        Err(err @ RenewalError::ArchiveFailed(_)) => {
            println!("\nRenewal rejected: {err}");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    }

    let report = scanner.scan(today + Duration::days(1), &shutdown)?;
    print_scan("Rescan", &report);

    let history = service.history(&unit, ObligationCategory::Insurance, PageRequest::first(10))?;
    println!("\nInsurance history: {} superseded record(s)", history.items.len());

    worker.drain_pending();
    let stats = delivery.stats();
    println!(
        "\nNotices delivered {} | failed {} | awaiting retry {}",
        stats.delivered, stats.failed, stats.awaiting_retry
    );
    for notice in notifier.sent() {
        println!(
            "  - {} to {} ({} recipient(s))",
            notice.template,
            notice.audience,
            notice.recipients.len()
        );
    }

    Ok(())
}

fn print_scan(title: &str, report: &ScanReport) {
    println!(
        "\n{title}: examined {} | due {} | alerts created {} | already pending {} | failures {}",
        report.examined, report.due, report.alerts_created, report.alerts_skipped, report.failures
    );
}
