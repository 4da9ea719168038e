//! End-to-end flow: encrypt payment data, accumulate a failed-login storm,
//! watch the monitor block and alert, then walk the alert to resolution.

use std::sync::Arc;
use std::time::Duration;

use mealdesk_security::audit::{AuditAction, AuditStore, NewAuditRecord};
use mealdesk_security::monitor::{AlertStatus, AlertType, MemoryAlertStore};
use mealdesk_security::{
    AuditLogger, AuditQuery, EncryptionService, Error, MemoryAuditStore, PaymentCard,
    SecurityConfig, SecurityMonitor,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn test_config() -> SecurityConfig {
    let mut config = SecurityConfig::new("an-integration-test-key-with-entropy");
    // Keep password hashing fast; cost parameters are exercised elsewhere
    config.password.memory_kib = 8;
    config.password.iterations = 1;
    config
}

#[tokio::test]
async fn payment_data_never_leaves_in_the_clear() {
    init_tracing();
    let encryption = EncryptionService::new(&test_config()).unwrap();
    let card = PaymentCard {
        card_number: "4111111111111111".to_string(),
        cvv: "123".to_string(),
        expiry_date: "12/27".to_string(),
    };

    let envelope = encryption.encrypt_payment_data(&card).unwrap();
    assert!(!envelope.contains("4111111111111111"));
    assert!(!envelope.contains("123"));

    let restored = encryption.decrypt_payment_data(&envelope).unwrap();
    assert_eq!(restored.card_number, card.card_number);
    assert_eq!(restored.cvv, card.cvv);
    assert_eq!(restored.expiry_date, card.expiry_date);

    // A service built from different key material cannot read the envelope
    let other =
        EncryptionService::new(&SecurityConfig::new("a-completely-different-key-here!")).unwrap();
    assert!(matches!(
        other.decrypt_payment_data(&envelope),
        Err(Error::Decryption)
    ));
}

#[tokio::test]
async fn login_storm_is_blocked_alerted_and_resolved() {
    init_tracing();
    let audit_store = Arc::new(MemoryAuditStore::new());
    let alert_store = Arc::new(MemoryAlertStore::new());
    let logger = Arc::new(AuditLogger::new(
        audit_store.clone(),
        Duration::from_secs(2),
    ));
    let config = test_config();
    let monitor = SecurityMonitor::new(
        logger.clone(),
        alert_store.clone(),
        config.detectors.clone(),
        config.rate.clone(),
    );

    // An attacker burns through five wrong passwords for user 42
    for _ in 0..5 {
        logger
            .log_user_login(42, "203.0.113.7", Some("curl/8.0"), false, Some("bad password"))
            .await;
    }

    let status = monitor
        .perform_security_check(Some(42), "203.0.113.7", Some("curl/8.0"), "/login")
        .await;
    assert!(status.is_blocked);
    assert!(status.failed_logins.is_tripped());
    assert_eq!(status.failed_logins.observed(), 5);

    // Exactly one alert, and a sixth attempt does not duplicate it
    let open = monitor.get_active_security_alerts().await.unwrap();
    assert_eq!(open.len(), 1);
    let alert = &open[0];
    assert_eq!(alert.alert_type, AlertType::FailedLoginAttempts);
    assert_eq!(alert.subject_user_id, Some(42));

    logger
        .log_user_login(42, "203.0.113.7", Some("curl/8.0"), false, Some("bad password"))
        .await;
    let again = monitor
        .perform_security_check(Some(42), "203.0.113.7", Some("curl/8.0"), "/login")
        .await;
    assert!(again.is_blocked);
    assert_eq!(monitor.get_active_security_alerts().await.unwrap().len(), 1);

    // The trail recorded both the blocked checks and the alert itself
    let checks = audit_store
        .search(&AuditQuery::default().with_action(AuditAction::SecurityCheck))
        .await
        .unwrap();
    assert_eq!(checks.len(), 2);
    assert!(checks.iter().all(|record| !record.success));
    let triggered = audit_store
        .search(&AuditQuery::default().with_action(AuditAction::SecurityAlertTriggered))
        .await
        .unwrap();
    assert_eq!(triggered.len(), 1);

    // Operator workflow: investigate, then resolve; terminal state is final
    let id = alert.id;
    let investigating = monitor.start_investigation(id, "ops.noor").await.unwrap();
    assert_eq!(investigating.status, AlertStatus::Investigating);
    assert_eq!(investigating.assigned_to.as_deref(), Some("ops.noor"));

    let resolved = monitor
        .resolve_security_alert(id, "ops.noor", "credentials rotated, IP banned")
        .await
        .unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);
    assert!(resolved.resolved_at.is_some());

    assert!(matches!(
        monitor.resolve_security_alert(id, "ops.kim", "double close").await,
        Err(Error::IllegalTransition(_))
    ));
    assert!(monitor.get_active_security_alerts().await.unwrap().is_empty());
}

#[tokio::test]
async fn audit_details_are_sanitized_before_storage() {
    let audit_store = Arc::new(MemoryAuditStore::new());
    let logger = AuditLogger::new(audit_store.clone(), Duration::from_secs(2));

    let outcome = logger
        .log(
            NewAuditRecord::new(AuditAction::SensitiveDataChange, "payment_method")
                .actor(9)
                .details(serde_json::json!({
                    "card_number": "4111111111111111",
                    "brand": "visa",
                })),
        )
        .await;
    assert!(outcome.is_recorded());

    let records = audit_store.search(&AuditQuery::default()).await.unwrap();
    let details = records[0].details.as_ref().unwrap();
    assert_eq!(details["card_number"], "[REDACTED]");
    assert_eq!(details["brand"], "visa");
}

#[tokio::test]
async fn password_hashes_verify_and_reject() {
    let encryption = EncryptionService::new(&test_config()).unwrap();
    let hash = encryption.hash_password("correct horse battery staple").unwrap();
    assert!(hash.starts_with("$argon2id$"));
    assert!(encryption
        .verify_password("correct horse battery staple", &hash)
        .unwrap());
    assert!(!encryption.verify_password("correct horse", &hash).unwrap());
}
