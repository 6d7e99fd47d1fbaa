use std::sync::Arc;

use chrono::{Duration, NaiveDate};

use super::common::*;
use crate::config::LoyaltyConfig;
use crate::loyalty::domain::{
    ApplicableTiers, BusinessAccount, BusinessId, BusinessRegistration, BusinessStatus, CustomerId,
    CustomerSignup, CustomerType, Gender, MissionAudience, MissionDraft, NotificationRequest,
    ProgramDefinition, RegistryStatus, ReviewDecision, TransactionRequest,
};
use crate::loyalty::import::{TransactionImportError, TransactionImporter};
use crate::loyalty::memory::{InMemoryLoyaltyStore, InMemoryNotificationPublisher};
use crate::loyalty::points::PointsError;
use crate::loyalty::repository::{LoyaltyRepository, RepositoryError};
use crate::loyalty::service::{LoyaltyService, LoyaltyServiceError};
use crate::loyalty::tiers::TierError;

fn purchase(customer: &str, bill_amount: u64) -> TransactionRequest {
    TransactionRequest {
        customer_id: CustomerId(customer.to_string()),
        bill_amount,
    }
}

fn draft(tiers: ApplicableTiers) -> MissionDraft {
    MissionDraft {
        title: "Try the new croissant".to_string(),
        description: "Order one this week".to_string(),
        expires_at: now() + Duration::days(3),
        applicable_tiers: tiers,
        audience: MissionAudience::default(),
    }
}

#[test]
fn pending_business_cannot_transact() {
    let (service, _, _) = build_service();
    let account = service
        .register_business(
            BusinessRegistration {
                name: "  Corner Bakery ".to_string(),
                category: String::new(),
            },
            now(),
        )
        .expect("registers");
    assert_eq!(account.name, "Corner Bakery");
    assert_eq!(account.status, BusinessStatus::Pending);

    match service.record_transaction(&account.id, purchase("cus-1", 100), now()) {
        Err(LoyaltyServiceError::BusinessNotApproved { status, .. }) => {
            assert_eq!(status, BusinessStatus::Pending)
        }
        other => panic!("expected approval error, got {other:?}"),
    }

    let rejected = service
        .review_business(&account.id, ReviewDecision::Reject)
        .expect("review succeeds");
    assert_eq!(rejected.status, BusinessStatus::Rejected);
}

#[test]
fn blank_business_name_is_rejected() {
    let (service, _, _) = build_service();
    let result = service.register_business(
        BusinessRegistration {
            name: "   ".to_string(),
            category: "food".to_string(),
        },
        now(),
    );
    assert!(matches!(result, Err(LoyaltyServiceError::Invalid(_))));
}

#[test]
fn transaction_without_program_is_not_found() {
    let (service, _, _) = build_service();
    let business = approved_business(&service, false);
    match service.record_transaction(&business, purchase("cus-1", 100), now()) {
        Err(LoyaltyServiceError::ProgramNotConfigured(id)) => assert_eq!(id, business),
        other => panic!("expected missing program, got {other:?}"),
    }
}

#[test]
fn first_transaction_auto_enrolls_and_resolves_tier() {
    let (service, store, _) = build_service();
    let business = approved_business(&service, true);

    let receipt = service
        .record_transaction(&business, purchase("cus-1", 75), now())
        .expect("transaction recorded");

    assert!(receipt.enrolled);
    assert!(!receipt.tier_changed());
    assert_eq!(receipt.transaction.points_awarded, 150);
    assert_eq!(receipt.loyalty.points, 150);
    assert_eq!(receipt.loyalty.current_tier_name, "Silver");
    assert_eq!(receipt.loyalty.version, 1);

    let history = store
        .transactions_for(&CustomerId("cus-1".to_string()), Some(&business))
        .expect("history readable");
    assert_eq!(history.len(), 1);
}

#[test]
fn later_transactions_accumulate_and_promote() {
    let (service, _, _) = build_service();
    let business = approved_business(&service, true);

    service
        .record_transaction(&business, purchase("cus-1", 75), now())
        .expect("first purchase");
    let receipt = service
        .record_transaction(&business, purchase("cus-1", 175), now())
        .expect("second purchase");

    assert!(!receipt.enrolled);
    assert_eq!(receipt.previous_tier.as_deref(), Some("Silver"));
    assert!(receipt.tier_changed());
    assert_eq!(receipt.loyalty.points, 500);
    assert_eq!(receipt.loyalty.current_tier_name, "Gold");
}

#[test]
fn zero_bill_is_rejected_before_anything_is_written() {
    let (service, store, _) = build_service();
    let business = approved_business(&service, true);

    let result = service.record_transaction(&business, purchase("cus-1", 0), now());
    assert!(matches!(
        result,
        Err(LoyaltyServiceError::Points(PointsError::NonPositiveBill))
    ));
    assert!(store
        .fetch_loyalty(&CustomerId("cus-1".to_string()), &business)
        .expect("readable")
        .is_none());
}

#[test]
fn manual_enrollment_starts_at_lowest_tier() {
    let (service, _, _) = build_service();
    let business = approved_business(&service, true);
    let customer = CustomerId("cus-9".to_string());

    let loyalty = service
        .enroll_customer(&business, &customer, now())
        .expect("enrolls");
    assert_eq!(loyalty.points, 0);
    assert_eq!(loyalty.current_tier_name, "Bronze");

    match service.enroll_customer(&business, &customer, now()) {
        Err(LoyaltyServiceError::AlreadyEnrolled { .. }) => {}
        other => panic!("expected duplicate enrollment error, got {other:?}"),
    }
}

#[test]
fn manual_enrollment_without_program_uses_default_tier() {
    let store = Arc::new(InMemoryLoyaltyStore::default());
    let service = LoyaltyService::new(
        store.clone(),
        store,
        Arc::new(InMemoryNotificationPublisher::default()),
        LoyaltyConfig {
            default_tier_name: "Member".to_string(),
            write_retries: 0,
        },
    );
    let business = approved_business(&service, false);

    let loyalty = service
        .enroll_customer(&business, &CustomerId("cus-1".to_string()), now())
        .expect("enrolls");
    assert_eq!(loyalty.current_tier_name, "Member");
}

#[test]
fn editing_tiers_recalculates_every_balance() {
    let (service, store, _) = build_service();
    let business = approved_business(&service, true);
    for (customer, bill) in [("cus-a", 10), ("cus-b", 60), ("cus-c", 300)] {
        service
            .record_transaction(&business, purchase(customer, bill), now())
            .expect("purchase recorded");
    }

    let update = service
        .configure_program(
            &business,
            ProgramDefinition {
                points_rate: 3,
                tiers: vec![tier("Member", 0), tier("Insider", 20), tier("Elite", 600)],
            },
        )
        .expect("program updated");
    assert_eq!(update.recalculated, 3);
    assert_eq!(update.program.points_rate, 3);

    let tiers: Vec<(String, String)> = store
        .loyalties_for_business(&business)
        .expect("readable")
        .into_iter()
        .map(|loyalty| (loyalty.customer_id.0, loyalty.current_tier_name))
        .collect();
    assert_eq!(
        tiers,
        vec![
            ("cus-a".to_string(), "Insider".to_string()),
            ("cus-b".to_string(), "Insider".to_string()),
            ("cus-c".to_string(), "Elite".to_string()),
        ]
    );
}

#[test]
fn invalid_program_definitions_are_rejected() {
    let (service, _, _) = build_service();
    let business = approved_business(&service, false);

    let zero_rate = service.configure_program(
        &business,
        ProgramDefinition {
            points_rate: 0,
            tiers: standard_tiers(),
        },
    );
    assert!(matches!(
        zero_rate,
        Err(LoyaltyServiceError::Points(PointsError::NonPositiveRate))
    ));

    let duplicate = service.configure_program(
        &business,
        ProgramDefinition {
            points_rate: 1,
            tiers: vec![tier("Gold", 0), tier("Gold", 100)],
        },
    );
    assert!(matches!(
        duplicate,
        Err(LoyaltyServiceError::Tier(TierError::DuplicateName(_)))
    ));
}

#[test]
fn stale_writes_are_retried() {
    let store = Arc::new(StaleStore::failing(2));
    let missions = Arc::new(InMemoryLoyaltyStore::default());
    let service = LoyaltyService::new(
        store.clone(),
        missions,
        Arc::new(InMemoryNotificationPublisher::default()),
        LoyaltyConfig::default(),
    );
    let business = BusinessId("biz-stale".to_string());
    store
        .insert_business(BusinessAccount {
            id: business.clone(),
            name: "Stale Shop".to_string(),
            category: String::new(),
            status: BusinessStatus::Approved,
            registered_at: now(),
        })
        .expect("business stored");
    service
        .configure_program(&business, standard_program())
        .expect("program configured");

    let receipt = service
        .record_transaction(&business, purchase("cus-1", 60), now())
        .expect("retries succeed");
    assert_eq!(receipt.loyalty.points, 120);
}

#[test]
fn exhausted_retries_surface_the_conflict() {
    let store = Arc::new(StaleStore::failing(5));
    let service = LoyaltyService::new(
        store.clone(),
        Arc::new(InMemoryLoyaltyStore::default()),
        Arc::new(InMemoryNotificationPublisher::default()),
        LoyaltyConfig {
            default_tier_name: "Bronze".to_string(),
            write_retries: 1,
        },
    );
    let business = BusinessId("biz-busy".to_string());
    store
        .insert_business(BusinessAccount {
            id: business.clone(),
            name: "Busy Shop".to_string(),
            category: String::new(),
            status: BusinessStatus::Approved,
            registered_at: now(),
        })
        .expect("business stored");
    service
        .configure_program(&business, standard_program())
        .expect("program configured");

    let result = service.record_transaction(&business, purchase("cus-1", 60), now());
    assert!(matches!(
        result,
        Err(LoyaltyServiceError::Repository(RepositoryError::StaleWrite))
    ));
    assert!(service
        .customer_transactions(&CustomerId("cus-1".to_string()))
        .expect("history readable")
        .is_empty());
}

#[test]
fn overflowing_balance_leaves_history_untouched() {
    let (service, _, _) = build_service();
    let business = approved_business(&service, false);
    service
        .configure_program(
            &business,
            ProgramDefinition {
                points_rate: 1,
                tiers: standard_tiers(),
            },
        )
        .expect("program configured");
    let customer = CustomerId("cus-1".to_string());

    service
        .record_transaction(&business, purchase("cus-1", u64::MAX - 1), now())
        .expect("large purchase fits");
    let result = service.record_transaction(&business, purchase("cus-1", 10), now());
    assert!(matches!(
        result,
        Err(LoyaltyServiceError::Points(PointsError::BalanceOverflow { .. }))
    ));

    let history = service
        .customer_transactions(&customer)
        .expect("history readable");
    assert_eq!(history.len(), 1);
    let overview = service.customer_overview(&customer).expect("overview builds");
    assert_eq!(overview[0].points, history[0].points_awarded);
}

#[test]
fn point_of_sale_enrollment_does_not_need_a_profile() {
    let (service, _, _) = build_service();
    let business = approved_business(&service, true);
    let walk_in = CustomerId("walk-in-42".to_string());

    let receipt = service
        .record_transaction(&business, purchase("walk-in-42", 20), now())
        .expect("unregistered customers can earn points");
    assert!(receipt.enrolled);

    let open = service
        .create_mission(&business, draft(ApplicableTiers::All), now())
        .expect("mission created");
    let mut women_only = draft(ApplicableTiers::All);
    women_only.audience.genders = vec![Gender::Female];
    service
        .create_mission(&business, women_only, now())
        .expect("mission created");

    let visible = service
        .eligible_missions(&walk_in, now())
        .expect("missions listed");
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].mission.id, open.id);
}

#[test]
fn customer_overview_lists_progress_and_rewards() {
    let (service, _, _) = build_service();
    let business = approved_business(&service, true);
    service
        .record_transaction(&business, purchase("cus-1", 60), now())
        .expect("purchase recorded");

    let overview = service
        .customer_overview(&CustomerId("cus-1".to_string()))
        .expect("overview builds");
    assert_eq!(overview.len(), 1);
    let view = &overview[0];
    assert_eq!(view.business_name, "Corner Bakery");
    assert_eq!(view.points, 120);
    assert_eq!(view.current_tier, "Silver");
    assert_eq!(view.next_tier.as_deref(), Some("Gold"));
    assert_eq!(view.points_to_next_tier, Some(380));
    assert!(view.rewards.is_empty());

    service
        .record_transaction(&business, purchase("cus-1", 200), now())
        .expect("purchase recorded");
    let overview = service
        .customer_overview(&CustomerId("cus-1".to_string()))
        .expect("overview builds");
    assert_eq!(overview[0].current_tier, "Gold");
    assert!(overview[0].next_tier.is_none());
    assert_eq!(overview[0].rewards.len(), 2);
}

#[test]
fn missions_follow_tier_and_completion_rules() {
    let (service, _, _) = build_service();
    let business = approved_business(&service, true);
    let customer = CustomerId("cus-1".to_string());
    service
        .record_transaction(&business, purchase("cus-1", 10), now())
        .expect("bronze customer");

    let everyone = service
        .create_mission(&business, draft(ApplicableTiers::All), now())
        .expect("mission created");
    let gold = service
        .create_mission(&business, draft(named(&["Gold"])), now())
        .expect("mission created");

    let visible = service
        .eligible_missions(&customer, now())
        .expect("missions listed");
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].mission.id, everyone.id);
    assert!(visible[0].registry_status.is_none());

    match service.opt_into_mission(&customer, &gold.id, now()) {
        Err(LoyaltyServiceError::MissionUnavailable(id)) => assert_eq!(id, gold.id),
        other => panic!("expected unavailable mission, got {other:?}"),
    }

    let registry = service
        .opt_into_mission(&customer, &everyone.id, now())
        .expect("opt in succeeds");
    assert_eq!(registry.status, RegistryStatus::InProgress);
    assert!(matches!(
        service.opt_into_mission(&customer, &everyone.id, now()),
        Err(LoyaltyServiceError::MissionAlreadyInProgress(_))
    ));

    let visible = service
        .eligible_missions(&customer, now())
        .expect("missions listed");
    assert_eq!(visible[0].registry_status, Some(RegistryStatus::InProgress));

    service
        .update_registry_status(&registry.id, RegistryStatus::Completed, now())
        .expect("completion recorded");
    assert!(service
        .eligible_missions(&customer, now())
        .expect("missions listed")
        .is_empty());
    assert!(matches!(
        service.opt_into_mission(&customer, &everyone.id, now()),
        Err(LoyaltyServiceError::MissionAlreadyCompleted(_))
    ));
}

#[test]
fn failed_missions_can_be_retried() {
    let (service, _, _) = build_service();
    let business = approved_business(&service, true);
    let customer = CustomerId("cus-1".to_string());
    service
        .enroll_customer(&business, &customer, now())
        .expect("enrolled");
    let mission = service
        .create_mission(&business, draft(ApplicableTiers::All), now())
        .expect("mission created");

    let first = service
        .opt_into_mission(&customer, &mission.id, now())
        .expect("opt in");
    service
        .update_registry_status(&first.id, RegistryStatus::Failed, now())
        .expect("failure recorded");
    match service.update_registry_status(&first.id, RegistryStatus::Completed, now()) {
        Err(LoyaltyServiceError::InvalidRegistryTransition { from, to }) => {
            assert_eq!(from, RegistryStatus::Failed);
            assert_eq!(to, RegistryStatus::Completed);
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }

    let second = service
        .opt_into_mission(&customer, &mission.id, now())
        .expect("second attempt allowed");
    assert_ne!(first.id, second.id);
}

#[test]
fn missions_respect_audience_and_expiry() {
    let (service, _, _) = build_service();
    let business = approved_business(&service, true);
    let customer = service
        .register_customer(CustomerSignup {
            name: "Ravi".to_string(),
            gender: Some(Gender::Male),
            birth_date: NaiveDate::from_ymd_opt(2010, 1, 1),
            location: Some("Delhi".to_string()),
        })
        .expect("customer registered");
    service
        .enroll_customer(&business, &customer.id, now())
        .expect("enrolled");

    let mut adults = draft(ApplicableTiers::All);
    adults.audience.min_age = Some(18);
    service
        .create_mission(&business, adults, now())
        .expect("mission created");

    let mut newcomers = draft(ApplicableTiers::All);
    newcomers.audience.customer_type = CustomerType::New;
    let newcomer_mission = service
        .create_mission(&business, newcomers, now())
        .expect("mission created");

    let visible = service
        .eligible_missions(&customer.id, now())
        .expect("missions listed");
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].mission.id, newcomer_mission.id);

    let later = now() + Duration::days(4);
    assert!(service
        .eligible_missions(&customer.id, later)
        .expect("missions listed")
        .is_empty());
}

#[test]
fn mission_drafts_are_validated() {
    let (service, _, _) = build_service();
    let business = approved_business(&service, true);

    let mut expired = draft(ApplicableTiers::All);
    expired.expires_at = now() - Duration::hours(1);
    assert!(matches!(
        service.create_mission(&business, expired, now()),
        Err(LoyaltyServiceError::Invalid(_))
    ));

    match service.create_mission(&business, draft(named(&["Diamond"])), now()) {
        Err(LoyaltyServiceError::Invalid(message)) => assert!(message.contains("Diamond")),
        other => panic!("expected unknown tier error, got {other:?}"),
    }
}

#[test]
fn customers_without_loyalty_see_no_missions() {
    let (service, _, _) = build_service();
    let business = approved_business(&service, true);
    service
        .create_mission(&business, draft(ApplicableTiers::All), now())
        .expect("mission created");

    let visible = service
        .eligible_missions(&CustomerId("stranger".to_string()), now())
        .expect("missions listed");
    assert!(visible.is_empty());
}

#[test]
fn notifications_target_selected_tiers() {
    let (service, _, publisher) = build_service();
    let business = approved_business(&service, true);
    for (customer, bill) in [("cus-a", 10), ("cus-b", 60), ("cus-c", 300)] {
        service
            .record_transaction(&business, purchase(customer, bill), now())
            .expect("purchase recorded");
    }

    let receipt = service
        .notify_customers(
            &business,
            NotificationRequest {
                title: "Members evening".to_string(),
                body: "Doors open at 7".to_string(),
                tiers: vec!["Silver".to_string(), "Gold".to_string()],
            },
        )
        .expect("broadcast sent");
    assert_eq!(receipt.delivered, 2);
    assert_eq!(receipt.failed, 0);

    let recipients: Vec<String> = publisher
        .messages()
        .into_iter()
        .map(|message| message.customer_id.0)
        .collect();
    assert_eq!(recipients, vec!["cus-b".to_string(), "cus-c".to_string()]);
}

#[test]
fn notification_failures_are_counted_not_fatal() {
    let store = Arc::new(InMemoryLoyaltyStore::default());
    let publisher = Arc::new(FlakyPublisher {
        reject: CustomerId("cus-a".to_string()),
        delivered: InMemoryNotificationPublisher::default(),
    });
    let service = LoyaltyService::new(
        store.clone(),
        store,
        publisher.clone(),
        LoyaltyConfig::default(),
    );
    let account = service
        .register_business(
            BusinessRegistration {
                name: "Tea House".to_string(),
                category: "drinks".to_string(),
            },
            now(),
        )
        .expect("registers");
    service
        .review_business(&account.id, ReviewDecision::Approve)
        .expect("approved");
    service
        .configure_program(&account.id, standard_program())
        .expect("program configured");
    for customer in ["cus-a", "cus-b"] {
        service
            .enroll_customer(&account.id, &CustomerId(customer.to_string()), now())
            .expect("enrolled");
    }

    let receipt = service
        .notify_customers(
            &account.id,
            NotificationRequest {
                title: "New menu".to_string(),
                body: String::new(),
                tiers: Vec::new(),
            },
        )
        .expect("broadcast completes");
    assert_eq!(receipt.delivered, 1);
    assert_eq!(receipt.failed, 1);
    assert_eq!(publisher.delivered.messages().len(), 1);
}

#[test]
fn csv_import_applies_rows_and_collects_rejections() {
    let (service, _, _) = build_service();
    let business = approved_business(&service, true);
    let csv = "customer_id,bill_amount,recorded_at\n\
cus-1,50,2025-05-30T10:00:00Z\n\
cus-2,abc,\n\
cus-1,0,\n\
cus-2,25,2025-05-31\n";

    let summary = TransactionImporter::from_reader(csv.as_bytes(), &service, &business, now())
        .expect("import runs");
    assert_eq!(summary.imported, 2);
    assert_eq!(summary.points_awarded, 150);
    let lines: Vec<usize> = summary.rejected.iter().map(|row| row.line).collect();
    assert_eq!(lines, vec![3, 4]);

    let history = service
        .customer_transactions(&CustomerId("cus-2".to_string()))
        .expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].recorded_at.to_rfc3339(), "2025-05-31T00:00:00+00:00");
}

#[test]
fn csv_import_rejects_unreadable_timestamps() {
    let (service, _, _) = build_service();
    let business = approved_business(&service, true);
    let csv = "customer_id,bill_amount,recorded_at
cus-1,50,yesterday
cus-1,20,
";

    let summary = TransactionImporter::from_reader(csv.as_bytes(), &service, &business, now())
        .expect("import runs");
    assert_eq!(summary.imported, 1);
    assert_eq!(summary.rejected.len(), 1);
    assert_eq!(summary.rejected[0].line, 2);
    assert!(summary.rejected[0].reason.contains("yesterday"));

    let history = service
        .customer_transactions(&CustomerId("cus-1".to_string()))
        .expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].bill_amount, 20);
    assert_eq!(history[0].recorded_at, now());
}

#[test]
fn csv_import_totals_points_across_large_balances() {
    let (service, _, _) = build_service();
    let business = approved_business(&service, false);
    service
        .configure_program(
            &business,
            ProgramDefinition {
                points_rate: 1,
                tiers: standard_tiers(),
            },
        )
        .expect("program configured");
    let csv = "customer_id,bill_amount,recorded_at
cus-a,9223372036854775808,
cus-b,9223372036854775808,
";

    let summary = TransactionImporter::from_reader(csv.as_bytes(), &service, &business, now())
        .expect("import runs");
    assert_eq!(summary.imported, 2);
    assert_eq!(summary.points_awarded, 1u128 << 64);
}

#[test]
fn csv_import_aborts_for_unapproved_business() {
    let (service, _, _) = build_service();
    let account = service
        .register_business(
            BusinessRegistration {
                name: "Pending Shop".to_string(),
                category: String::new(),
            },
            now(),
        )
        .expect("registers");

    let csv = "customer_id,bill_amount,recorded_at\ncus-1,50,\n";
    let result = TransactionImporter::from_reader(csv.as_bytes(), &service, &account.id, now());
    assert!(matches!(
        result,
        Err(TransactionImportError::Service(
            LoyaltyServiceError::BusinessNotApproved { .. }
        ))
    ));
}
