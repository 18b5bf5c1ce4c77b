use serde_json::json;
use syncstore::errors::SyncError;
use syncstore::models::Subscription;
use syncstore::{EntityKind, store::EntityStore};

mod support;

use support::payloads::{self, record};

async fn item_deleted(ctx: &support::TestContext, id: &str) -> anyhow::Result<Option<bool>> {
    let row = ctx.store.get(EntityKind::SubscriptionItem, id).await?;
    Ok(row.and_then(|row| row["deleted"].as_bool()))
}

async fn seed(ctx: &support::TestContext) -> anyhow::Result<()> {
    ctx.store
        .upsert(EntityKind::Customer, &[record(payloads::customer("cus_1"))])
        .await?;
    Ok(())
}

#[tokio::test]
async fn items_missing_from_snapshot_are_marked_deleted() -> anyhow::Result<()> {
    let ctx = support::init_test_context()?;
    seed(&ctx).await?;

    let first = record(payloads::subscription("sub_1", "cus_1", &["si_a", "si_b", "si_c"]));
    ctx.engine
        .sync_batch(EntityKind::Subscription, vec![first], true)
        .await?;
    for id in ["si_a", "si_b", "si_c"] {
        assert_ne!(item_deleted(&ctx, id).await?, Some(true), "{id}");
    }

    let second = record(payloads::subscription("sub_1", "cus_1", &["si_a", "si_c", "si_d"]));
    ctx.engine
        .sync_batch(EntityKind::Subscription, vec![second.clone()], true)
        .await?;

    assert_eq!(item_deleted(&ctx, "si_b").await?, Some(true));
    for id in ["si_a", "si_c", "si_d"] {
        assert_ne!(item_deleted(&ctx, id).await?, Some(true), "{id}");
    }

    // the same snapshot again changes nothing
    ctx.engine
        .sync_batch(EntityKind::Subscription, vec![second], true)
        .await?;
    assert_eq!(item_deleted(&ctx, "si_b").await?, Some(true));
    assert_ne!(item_deleted(&ctx, "si_d").await?, Some(true));
    assert!(ctx.fetcher.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn item_reappearing_in_snapshot_becomes_active_again() -> anyhow::Result<()> {
    let ctx = support::init_test_context()?;
    seed(&ctx).await?;

    for items in [&["si_a", "si_b"][..], &["si_a"][..], &["si_a", "si_b"][..]] {
        ctx.engine
            .sync_batch(
                EntityKind::Subscription,
                vec![record(payloads::subscription("sub_1", "cus_1", items))],
                true,
            )
            .await?;
        if items.len() == 1 {
            assert_eq!(item_deleted(&ctx, "si_b").await?, Some(true));
        }
    }

    assert_ne!(item_deleted(&ctx, "si_b").await?, Some(true));
    assert_ne!(item_deleted(&ctx, "si_a").await?, Some(true));
    Ok(())
}

#[tokio::test]
async fn typed_subscription_without_items_keeps_children() -> anyhow::Result<()> {
    let ctx = support::init_test_context()?;
    seed(&ctx).await?;
    ctx.engine
        .sync_batch(
            EntityKind::Subscription,
            vec![record(payloads::subscription("sub_1", "cus_1", &["si_a", "si_b"]))],
            true,
        )
        .await?;

    let update: Subscription = serde_json::from_value(json!({
        "id": "sub_1",
        "customer": "cus_1",
        "status": "past_due"
    }))?;
    let stored = ctx.engine.upsert_subscriptions(&[update], true).await?;
    assert_eq!(stored[0].status.as_deref(), Some("past_due"));

    assert_ne!(item_deleted(&ctx, "si_a").await?, Some(true));
    assert_ne!(item_deleted(&ctx, "si_b").await?, Some(true));
    Ok(())
}

#[tokio::test]
async fn reconcile_children_is_idempotent() -> anyhow::Result<()> {
    let ctx = support::init_test_context()?;
    seed(&ctx).await?;
    ctx.engine
        .sync_batch(
            EntityKind::Subscription,
            vec![record(payloads::subscription("sub_1", "cus_1", &["si_a", "si_b"]))],
            true,
        )
        .await?;

    let kept = vec!["si_a".to_string()];
    let marked = ctx
        .engine
        .reconcile_children(EntityKind::Subscription, "sub_1", &kept)
        .await?;
    assert_eq!(marked, 1);
    let marked = ctx
        .engine
        .reconcile_children(EntityKind::Subscription, "sub_1", &kept)
        .await?;
    assert_eq!(marked, 0);

    assert_eq!(item_deleted(&ctx, "si_b").await?, Some(true));
    assert_ne!(item_deleted(&ctx, "si_a").await?, Some(true));
    Ok(())
}

#[tokio::test]
async fn empty_snapshot_deletes_every_child() -> anyhow::Result<()> {
    let ctx = support::init_test_context()?;
    seed(&ctx).await?;
    ctx.engine
        .sync_batch(
            EntityKind::Subscription,
            vec![record(payloads::subscription("sub_1", "cus_1", &["si_a", "si_b"]))],
            true,
        )
        .await?;

    ctx.engine
        .sync_batch(
            EntityKind::Subscription,
            vec![record(payloads::subscription("sub_1", "cus_1", &[]))],
            true,
        )
        .await?;
    assert_eq!(item_deleted(&ctx, "si_a").await?, Some(true));
    assert_eq!(item_deleted(&ctx, "si_b").await?, Some(true));
    Ok(())
}

#[tokio::test]
async fn reconciliation_is_scoped_to_the_parent() -> anyhow::Result<()> {
    let ctx = support::init_test_context()?;
    seed(&ctx).await?;
    ctx.engine
        .sync_batch(
            EntityKind::Subscription,
            vec![
                record(payloads::subscription("sub_1", "cus_1", &["si_1a", "si_1b"])),
                record(payloads::subscription("sub_2", "cus_1", &["si_2a"])),
            ],
            true,
        )
        .await?;

    ctx.engine
        .sync_batch(
            EntityKind::Subscription,
            vec![record(payloads::subscription("sub_1", "cus_1", &["si_1a"]))],
            true,
        )
        .await?;

    assert_eq!(item_deleted(&ctx, "si_1b").await?, Some(true));
    assert_ne!(item_deleted(&ctx, "si_2a").await?, Some(true));
    Ok(())
}

#[tokio::test]
async fn paginated_items_are_upserted_but_not_reconciled() -> anyhow::Result<()> {
    let ctx = support::init_test_context()?;
    seed(&ctx).await?;
    ctx.engine
        .sync_batch(
            EntityKind::Subscription,
            vec![record(payloads::subscription("sub_1", "cus_1", &["si_a", "si_b"]))],
            true,
        )
        .await?;

    let mut partial = payloads::subscription("sub_1", "cus_1", &["si_a", "si_c"]);
    partial["items"]["has_more"] = json!(true);
    ctx.engine
        .sync_batch(EntityKind::Subscription, vec![record(partial)], true)
        .await?;

    assert_ne!(item_deleted(&ctx, "si_b").await?, Some(true));
    assert!(ctx.engine.exists_by_id(EntityKind::SubscriptionItem, "si_c").await?);
    Ok(())
}

#[tokio::test]
async fn subscription_without_items_field_leaves_children_alone() -> anyhow::Result<()> {
    let ctx = support::init_test_context()?;
    seed(&ctx).await?;
    ctx.engine
        .sync_batch(
            EntityKind::Subscription,
            vec![record(payloads::subscription("sub_1", "cus_1", &["si_a"]))],
            true,
        )
        .await?;

    let mut bare = payloads::subscription("sub_1", "cus_1", &[]);
    bare.as_object_mut().unwrap().remove("items");
    ctx.engine
        .sync_batch(EntityKind::Subscription, vec![record(bare)], true)
        .await?;

    assert_ne!(item_deleted(&ctx, "si_a").await?, Some(true));
    Ok(())
}

#[tokio::test]
async fn items_are_reassigned_to_the_snapshot_parent() -> anyhow::Result<()> {
    let ctx = support::init_test_context()?;
    seed(&ctx).await?;

    let mut subscription = payloads::subscription("sub_1", "cus_1", &["si_a"]);
    subscription["items"]["data"][0]["subscription"] = json!("sub_other");
    ctx.engine
        .sync_batch(EntityKind::Subscription, vec![record(subscription)], true)
        .await?;

    let item = ctx
        .store
        .get(EntityKind::SubscriptionItem, "si_a")
        .await?
        .expect("item stored");
    assert_eq!(item["subscription"], json!("sub_1"));
    assert!(ctx.fetcher.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn only_subscriptions_own_children() -> anyhow::Result<()> {
    let ctx = support::init_test_context()?;
    let err = ctx
        .engine
        .reconcile_children(EntityKind::Customer, "cus_1", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidArg(_)));
    Ok(())
}
