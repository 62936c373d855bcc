use super::*;
use admin_core::{reorder, ReorderCoordinator, ReorderOutcome};

fn product_draft(title: &str) -> ProductDraft {
    ProductDraft {
        title: title.to_string(),
        price: "149000".to_string(),
        old_price: "299000".to_string(),
        description: format!("{title} description"),
        image: format!("https://img.example/{title}.png"),
        buy_url: format!("https://shop.example/{title}"),
    }
}

fn testimonial_draft(name: &str) -> TestimonialDraft {
    TestimonialDraft {
        name: name.to_string(),
        role: "Student".to_string(),
        text: format!("{name} liked it"),
        image: String::new(),
    }
}

async fn seeded_products(storage: &Storage, titles: &[&str]) -> Vec<Product> {
    for title in titles {
        storage
            .create_product(&product_draft(title))
            .await
            .expect("product");
    }
    storage.list_products().await.expect("list")
}

fn titles(products: &[Product]) -> Vec<String> {
    products.iter().map(|p| p.title.clone()).collect()
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("storefront.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn new_products_append_after_last_position() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let products = seeded_products(&storage, &["ebook", "course", "template"]).await;

    assert_eq!(titles(&products), vec!["ebook", "course", "template"]);
    let positions: Vec<u32> = products.iter().map(|p| p.position).collect();
    assert_eq!(positions, vec![0, 1, 2]);
}

#[tokio::test]
async fn append_uses_max_position_even_with_gaps() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let products = seeded_products(&storage, &["a", "b", "c"]).await;
    assert!(storage.delete_product(products[1].id).await.expect("delete"));

    let added = storage
        .create_product(&product_draft("d"))
        .await
        .expect("product");
    assert_eq!(added.position, 3);
}

#[tokio::test]
async fn equal_positions_fall_back_to_insertion_order() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let products = seeded_products(&storage, &["first", "second"]).await;
    storage
        .set_product_position(products[1].id, 0)
        .await
        .expect("position");

    let listed = storage.list_products().await.expect("list");
    assert_eq!(titles(&listed), vec!["first", "second"]);
}

#[tokio::test]
async fn update_product_keeps_position() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let products = seeded_products(&storage, &["a", "b"]).await;

    let mut draft = product_draft("b");
    draft.price = "99000".into();
    let updated = storage
        .update_product(products[1].id, &draft)
        .await
        .expect("update")
        .expect("exists");
    assert_eq!(updated.price, "99000");
    assert_eq!(updated.position, 1);

    let missing = storage
        .update_product(ProductId(999), &draft)
        .await
        .expect("update");
    assert!(missing.is_none());
}

#[tokio::test]
async fn delete_reports_whether_row_existed() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let products = seeded_products(&storage, &["a"]).await;

    assert!(storage.delete_product(products[0].id).await.expect("delete"));
    assert!(!storage.delete_product(products[0].id).await.expect("delete"));
    assert!(storage
        .load_product(products[0].id)
        .await
        .expect("load")
        .is_none());
}

#[tokio::test]
async fn ids_are_not_reused_after_delete() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let products = seeded_products(&storage, &["a", "b"]).await;
    storage.delete_product(products[1].id).await.expect("delete");

    let added = storage
        .create_product(&product_draft("c"))
        .await
        .expect("product");
    assert!(added.id.0 > products[1].id.0);
}

#[tokio::test]
async fn testimonials_crud_and_order() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let first = storage
        .create_testimonial(&testimonial_draft("Rina"))
        .await
        .expect("testimonial");
    let second = storage
        .create_testimonial(&testimonial_draft("Budi"))
        .await
        .expect("testimonial");
    assert_eq!((first.position, second.position), (0, 1));

    let mut draft = testimonial_draft("Budi");
    draft.role = "Founder".into();
    let updated = storage
        .update_testimonial(second.id, &draft)
        .await
        .expect("update")
        .expect("exists");
    assert_eq!(updated.role, "Founder");

    assert!(storage
        .set_testimonial_position(second.id, 0)
        .await
        .expect("position"));
    assert!(storage
        .set_testimonial_position(first.id, 1)
        .await
        .expect("position"));
    let listed = storage.list_testimonials().await.expect("list");
    assert_eq!(listed[0].name, "Budi");

    assert!(storage
        .delete_testimonial(first.id)
        .await
        .expect("delete"));
    assert!(storage
        .load_testimonial(first.id)
        .await
        .expect("load")
        .is_none());
}

#[tokio::test]
async fn reorder_persists_new_positions() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let products = seeded_products(&storage, &["A", "B", "C"]).await;

    let report = reorder(&storage, products, 2, 0).await.expect("reorder");
    assert_eq!(report.outcome, ReorderOutcome::Applied { writes: 3 });

    let listed = storage.list_products().await.expect("list");
    assert_eq!(titles(&listed), vec!["C", "A", "B"]);
    let positions: Vec<u32> = listed.iter().map(|p| p.position).collect();
    assert_eq!(positions, vec![0, 1, 2]);
}

#[tokio::test]
async fn reorder_with_deleted_row_keeps_other_writes() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let stale = seeded_products(&storage, &["A", "B", "C"]).await;
    storage.delete_product(stale[0].id).await.expect("delete");

    let coordinator = ReorderCoordinator::new(storage.clone());
    let report = coordinator.reorder(stale, 2, 0).await.expect("reorder");
    assert_eq!(
        report.outcome,
        ReorderOutcome::Failed {
            attempted: 3,
            failed: 1
        }
    );

    let listed = storage.list_products().await.expect("list");
    let placed: Vec<(String, u32)> = listed
        .iter()
        .map(|p| (p.title.clone(), p.position))
        .collect();
    assert_eq!(placed, vec![("C".to_string(), 0), ("B".to_string(), 2)]);
}
