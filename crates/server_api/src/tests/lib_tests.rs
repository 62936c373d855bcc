use super::*;

async fn setup() -> ApiContext {
    setup_with_ttl(Duration::from_secs(3600)).await
}

async fn setup_with_ttl(snapshot_ttl: Duration) -> ApiContext {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    ApiContext::new(
        storage,
        AuthConfig {
            password_hash: auth::hash_password("open-sesame", 4).expect("hash"),
            session_secret: "secret".into(),
            session_ttl_seconds: 60,
        },
        PageSettings {
            hero: Hero {
                title: "Turn skills into digital income".into(),
                subtitle: "Premium digital products".into(),
            },
            default_buy_url: "https://shop.example/default".into(),
            snapshot_ttl,
        },
    )
}

fn product(title: &str, buy_url: &str) -> ProductDraft {
    ProductDraft {
        title: title.into(),
        price: "49000".into(),
        buy_url: buy_url.into(),
        ..ProductDraft::default()
    }
}

#[tokio::test]
async fn page_snapshot_is_reused_until_invalidated() {
    let ctx = setup().await;
    let first = page_data(&ctx).await.expect("page");
    assert!(first.products.is_empty());

    // Written behind the api's back, so the cached snapshot stays stale.
    ctx.storage
        .create_product(&product("hidden", ""))
        .await
        .expect("product");
    let cached = page_data(&ctx).await.expect("page");
    assert_eq!(cached, first);

    create_product(&ctx, &product("visible", ""))
        .await
        .expect("product");
    let fresh = page_data(&ctx).await.expect("page");
    assert!(fresh.version > first.version);
    assert_eq!(fresh.products.len(), 2);
    assert_eq!(fresh.hero.title, "Turn skills into digital income");
}

#[tokio::test]
async fn expired_snapshot_picks_up_out_of_process_writes() {
    let ctx = setup_with_ttl(Duration::from_millis(20)).await;
    let first = page_data(&ctx).await.expect("page");
    assert!(first.products.is_empty());

    // Same database, different writer: nothing here invalidates the cache.
    ctx.storage
        .create_product(&product("seeded by cli", ""))
        .await
        .expect("product");
    tokio::time::sleep(Duration::from_millis(60)).await;

    let refreshed = page_data(&ctx).await.expect("page");
    assert_eq!(refreshed.products.len(), 1);
    assert!(refreshed.version > first.version);
}

#[tokio::test]
async fn login_issues_verifiable_session() {
    let ctx = setup().await;
    let err = login(&ctx, "wrong").expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Unauthorized);

    let session = login(&ctx, "open-sesame").expect("login");
    let header = format!("Bearer {}", session.token);
    authorize(&ctx, Some(&header)).expect("authorized");

    assert_eq!(
        authorize(&ctx, None).expect_err("missing").code,
        ErrorCode::Unauthorized
    );
    assert_eq!(
        authorize(&ctx, Some("Bearer nonsense"))
            .expect_err("garbage")
            .code,
        ErrorCode::Unauthorized
    );
}

#[tokio::test]
async fn empty_password_hash_disables_login() {
    let mut ctx = setup().await;
    ctx.auth.password_hash = String::new();
    assert!(login(&ctx, "").is_err());
}

#[tokio::test]
async fn disabled_admin_refuses_well_signed_tokens() {
    let mut ctx = setup().await;
    ctx.auth.password_hash = String::new();
    let minted = auth::mint_session_token(&ctx.auth, Utc::now()).expect("token");
    let header = format!("Bearer {}", minted.token);

    let err = authorize(&ctx, Some(&header)).expect_err("admin disabled");
    assert_eq!(err.code, ErrorCode::Unauthorized);
}

#[tokio::test]
async fn empty_session_secret_disables_admin() {
    let mut ctx = setup().await;
    ctx.auth.session_secret = String::new();
    assert!(login(&ctx, "open-sesame").is_err());

    let minted = auth::mint_session_token(&ctx.auth, Utc::now()).expect("token");
    let header = format!("Bearer {}", minted.token);
    assert!(authorize(&ctx, Some(&header)).is_err());
}

#[tokio::test]
async fn drafts_missing_required_fields_are_rejected() {
    let ctx = setup().await;
    let err = create_product(&ctx, &product("", ""))
        .await
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Validation);
    assert_eq!(err.message, "title is required");

    let err = create_testimonial(&ctx, &TestimonialDraft::default())
        .await
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn unknown_items_report_not_found() {
    let ctx = setup().await;
    let missing_product = ProductId(404);
    assert_eq!(
        update_product(&ctx, missing_product, &product("x", ""))
            .await
            .expect_err("missing")
            .code,
        ErrorCode::NotFound
    );
    assert_eq!(
        delete_product(&ctx, missing_product)
            .await
            .expect_err("missing")
            .code,
        ErrorCode::NotFound
    );
    assert_eq!(
        set_testimonial_position(&ctx, TestimonialId(404), 0)
            .await
            .expect_err("missing")
            .code,
        ErrorCode::NotFound
    );
}

#[tokio::test]
async fn reorder_products_persists_and_signals_refresh() {
    let ctx = setup().await;
    let mut refresh = ctx.refresh.subscribe();
    for title in ["A", "B", "C"] {
        create_product(&ctx, &product(title, ""))
            .await
            .expect("product");
    }
    let before = page_data(&ctx).await.expect("page");

    let response = reorder_products(&ctx, 2, 0).await.expect("reorder");
    assert_eq!(response.writes, 3);
    let signal = refresh.recv().await.expect("signal");
    assert!(signal.succeeded);

    let after = page_data(&ctx).await.expect("page");
    assert!(after.version > before.version);
    let titles: Vec<&str> = after.products.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["C", "A", "B"]);
}

#[tokio::test]
async fn reorder_rejects_out_of_range_index() {
    let ctx = setup().await;
    create_testimonial(
        &ctx,
        &TestimonialDraft {
            name: "Rina".into(),
            text: "Helpful".into(),
            ..TestimonialDraft::default()
        },
    )
    .await
    .expect("testimonial");

    let err = reorder_testimonials(&ctx, 0, 3)
        .await
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn buy_link_falls_back_to_default() {
    let ctx = setup().await;
    let with_url = create_product(&ctx, &product("a", "https://shop.example/a"))
        .await
        .expect("product");
    let without_url = create_product(&ctx, &product("b", "  "))
        .await
        .expect("product");

    assert_eq!(buy_link(&ctx, with_url.id).await.url, "https://shop.example/a");
    assert_eq!(
        buy_link(&ctx, without_url.id).await.url,
        "https://shop.example/default"
    );
    assert_eq!(
        buy_link(&ctx, ProductId(999)).await.url,
        "https://shop.example/default"
    );
}
