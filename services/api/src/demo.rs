use crate::infra::{parse_tiers, TierList};
use chrono::{Duration, Utc};
use clap::Args;
use retenza::config::LoyaltyConfig;
use retenza::error::AppError;
use retenza::loyalty::{
    resolve_tier, ApplicableTiers, BusinessRegistration, CustomerId, InMemoryLoyaltyStore,
    InMemoryNotificationPublisher, LoyaltyRepository, LoyaltyService, MissionAudience,
    MissionDraft, NotificationRequest, ProgramDefinition, ReviewDecision, Reward, Tier, TierId,
    TransactionImporter, TransactionRequest,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct TierResolveArgs {
    /// Points balance to resolve
    #[arg(long)]
    pub(crate) points: u64,
    /// Tier ladder as a JSON array of {id, name, points_to_unlock, rewards}
    #[arg(long, value_parser = parse_tiers)]
    pub(crate) tiers: TierList,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Points awarded per currency unit spent
    #[arg(long, default_value_t = 2)]
    pub(crate) points_rate: u32,
    /// Comma-separated bill amounts, one demo customer per bill
    #[arg(long = "bills", value_delimiter = ',', default_values_t = [40u64, 75, 300])]
    pub(crate) bills: Vec<u64>,
    /// Optional point-of-sale CSV export (customer_id,bill_amount,recorded_at) to import
    #[arg(long)]
    pub(crate) csv: Option<PathBuf>,
}

pub(crate) fn run_tier_resolve(args: TierResolveArgs) -> Result<(), AppError> {
    let TierResolveArgs { points, tiers } = args;
    let tier = resolve_tier(points, &tiers.0)?;

    println!("{} points -> {}", points, tier.name);
    if tier.rewards.is_empty() {
        println!("  Rewards: none");
    } else {
        println!("  Rewards:");
        for reward in &tier.rewards {
            println!("    - {}", describe_reward(reward));
        }
    }

    let next = tiers
        .0
        .iter()
        .filter(|candidate| candidate.points_to_unlock > points.max(tier.points_to_unlock))
        .min_by_key(|candidate| candidate.points_to_unlock);
    match next {
        Some(next) => println!(
            "  Next tier: {} in {} points",
            next.name,
            next.points_to_unlock - points
        ),
        None => println!("  Next tier: none (top of the ladder)"),
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        points_rate,
        bills,
        csv,
    } = args;
    let now = Utc::now();

    let store = Arc::new(InMemoryLoyaltyStore::default());
    let publisher = Arc::new(InMemoryNotificationPublisher::default());
    let service = LoyaltyService::new(
        store.clone(),
        store.clone(),
        publisher.clone(),
        LoyaltyConfig::default(),
    );

    println!("Retenza loyalty demo");
    let account = match service.register_business(
        BusinessRegistration {
            name: "Corner Bakery".to_string(),
            category: "food".to_string(),
        },
        now,
    ) {
        Ok(account) => account,
        Err(err) => {
            println!("  Registration rejected: {}", err);
            return Ok(());
        }
    };
    println!("- Registered {} ({})", account.name, account.id);

    if let Err(err) = service.review_business(&account.id, ReviewDecision::Approve) {
        println!("  Review failed: {}", err);
        return Ok(());
    }
    let update = match service.configure_program(
        &account.id,
        ProgramDefinition {
            points_rate,
            tiers: demo_tiers(),
        },
    ) {
        Ok(update) => update,
        Err(err) => {
            println!("  Program rejected: {}", err);
            return Ok(());
        }
    };
    println!(
        "- Program: {} points per unit, tiers {}",
        update.program.points_rate,
        update
            .program
            .tiers
            .tiers()
            .iter()
            .map(|tier| format!("{}@{}", tier.name, tier.points_to_unlock))
            .collect::<Vec<_>>()
            .join(", ")
    );

    println!("\nTransactions");
    for (index, bill_amount) in bills.into_iter().enumerate() {
        let customer_id = CustomerId(format!("demo-customer-{}", index + 1));
        let request = TransactionRequest {
            customer_id,
            bill_amount,
        };
        match service.record_transaction(&account.id, request, now) {
            Ok(receipt) => println!(
                "  - {} spent {} -> +{} points, balance {} ({}){}",
                receipt.loyalty.customer_id,
                bill_amount,
                receipt.transaction.points_awarded,
                receipt.loyalty.points,
                receipt.loyalty.current_tier_name,
                if receipt.enrolled { ", enrolled" } else { "" }
            ),
            Err(err) => println!("  - bill {} rejected: {}", bill_amount, err),
        }
    }

    if let Some(path) = csv {
        let summary = TransactionImporter::from_path(&path, &service, &account.id, now)?;
        println!(
            "\nImported {} rows from {} (+{} points, {} rejected)",
            summary.imported,
            path.display(),
            summary.points_awarded,
            summary.rejected.len()
        );
        for rejection in &summary.rejected {
            println!("  - line {}: {}", rejection.line, rejection.reason);
        }
    }

    let mission = match service.create_mission(
        &account.id,
        MissionDraft {
            title: "Bring a friend".to_string(),
            description: "Visit with a friend before the weekend".to_string(),
            expires_at: now + Duration::days(7),
            applicable_tiers: ApplicableTiers::Named(vec![
                "Silver".to_string(),
                "Gold".to_string(),
            ]),
            audience: MissionAudience::default(),
        },
        now,
    ) {
        Ok(mission) => mission,
        Err(err) => {
            println!("  Mission rejected: {}", err);
            return Ok(());
        }
    };

    println!("\nMission '{}' (Silver and Gold only)", mission.title);
    let enrolled = match store.loyalties_for_business(&account.id) {
        Ok(loyalties) => loyalties,
        Err(err) => {
            println!("  Customer lookup failed: {}", err);
            return Ok(());
        }
    };
    for loyalty in &enrolled {
        let visible = service
            .eligible_missions(&loyalty.customer_id, now)
            .map(|missions| missions.iter().any(|view| view.mission.id == mission.id))
            .unwrap_or(false);
        println!(
            "  - {} ({}): {}",
            loyalty.customer_id,
            loyalty.current_tier_name,
            if visible { "eligible" } else { "not eligible" }
        );
    }

    match service.notify_customers(
        &account.id,
        NotificationRequest {
            title: "Gold members evening".to_string(),
            body: "Free coffee all night".to_string(),
            tiers: vec!["Gold".to_string()],
        },
    ) {
        Ok(receipt) => println!(
            "\nNotification: {} delivered, {} failed ({} queued in memory)",
            receipt.delivered,
            receipt.failed,
            publisher.messages().len()
        ),
        Err(err) => println!("\nNotification failed: {}", err),
    }

    Ok(())
}

fn demo_tiers() -> Vec<Tier> {
    vec![
        Tier {
            id: TierId("tier-bronze".to_string()),
            name: "Bronze".to_string(),
            points_to_unlock: 0,
            rewards: Vec::new(),
        },
        Tier {
            id: TierId("tier-silver".to_string()),
            name: "Silver".to_string(),
            points_to_unlock: 100,
            rewards: vec![Reward::Discount {
                percent: 5,
                usage_limit: None,
            }],
        },
        Tier {
            id: TierId("tier-gold".to_string()),
            name: "Gold".to_string(),
            points_to_unlock: 500,
            rewards: vec![
                Reward::Discount {
                    percent: 10,
                    usage_limit: None,
                },
                Reward::FreeItem {
                    item: "Coffee".to_string(),
                    usage_limit: Some(1),
                },
            ],
        },
    ]
}

fn describe_reward(reward: &Reward) -> String {
    let limit = match reward.usage_limit() {
        Some(limit) => format!(" (max {limit} uses)"),
        None => String::new(),
    };
    match reward {
        Reward::FreeItem { item, .. } => format!("free {item}{limit}"),
        Reward::Discount { percent, .. } => format!("{percent}% off{limit}"),
        Reward::Cashback { amount, .. } => format!("{amount} cashback{limit}"),
    }
}
