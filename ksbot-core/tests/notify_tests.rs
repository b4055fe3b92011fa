// File: ksbot-core/tests/notify_tests.rs

use std::sync::Arc;

use async_trait::async_trait;
use mockall::mock;
use mockall::predicate::{always, eq};
use serde_json::json;

use ksbot_core::notify::{DiscordWebhookNotifier, LogNotifier};
use ksbot_core::test_utils::helpers::codes;
use ksbot_core::{Error, HttpClient};
use ksbot_common::traits::Notifier;

mock! {
    Http {}
    #[async_trait]
    impl HttpClient for Http {
        async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<u16, Error>;
    }
}

const HOOK: &str = "https://discord.test/api/webhooks/1/abc";

#[tokio::test]
async fn test_discord_posts_settled_codes() -> Result<(), Error> {
    let mut http = MockHttp::new();
    http.expect_post_json()
        .with(
            eq(HOOK),
            eq(json!({ "content": "AAAA1, BBBB2 Gift Code(s) redeemed successfully for the list." })),
        )
        .times(1)
        .returning(|_, _| Ok(204));

    let notifier = DiscordWebhookNotifier::with_client(HOOK, Arc::new(http));
    notifier.notify_settled(&codes(&["AAAA1", "BBBB2"])).await?;
    Ok(())
}

#[tokio::test]
async fn test_discord_skips_empty_batch() -> Result<(), Error> {
    let mut http = MockHttp::new();
    http.expect_post_json().with(always(), always()).times(0);

    let notifier = DiscordWebhookNotifier::with_client(HOOK, Arc::new(http));
    notifier.notify_settled(&[]).await?;
    Ok(())
}

#[tokio::test]
async fn test_discord_rejected_status_is_an_error() -> Result<(), Error> {
    let mut http = MockHttp::new();
    http.expect_post_json().returning(|_, _| Ok(429));

    let notifier = DiscordWebhookNotifier::with_client(HOOK, Arc::new(http));
    let result = notifier.notify_settled(&codes(&["AAAA1"])).await;
    assert!(matches!(result, Err(Error::Notify(_))));
    Ok(())
}

#[tokio::test]
async fn test_log_notifier_never_fails() -> Result<(), Error> {
    LogNotifier.notify_settled(&[]).await?;
    LogNotifier.notify_settled(&codes(&["AAAA1"])).await?;
    Ok(())
}
