//! Integration tests for database operations.

use mini_blog::db::{
    delete_comment, delete_post, get_comment, get_post, insert_comment, insert_post,
    list_comments_for_post, list_posts, Database, DbError, NewComment, NewPost, Param,
};
use tempfile::TempDir;

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

async fn create_post(db: &Database, title: &str) -> i64 {
    let new_post = NewPost {
        title: title.to_string(),
        content: format!("Body of {title}"),
    };
    insert_post(db, &new_post).await.unwrap().id
}

async fn create_comment(db: &Database, post_id: i64, parent_id: Option<i64>, content: &str) -> i64 {
    let new_comment = NewComment {
        post_id,
        parent_id,
        author: "tester".to_string(),
        content: content.to_string(),
    };
    insert_comment(db, &new_comment).await.unwrap().id
}

#[tokio::test]
async fn test_insert_and_get_post() {
    let (db, _temp_dir) = setup_db().await;

    let new_post = NewPost {
        title: "Test Post".to_string(),
        content: "Hello world".to_string(),
    };
    let created = insert_post(&db, &new_post)
        .await
        .expect("Failed to insert post");
    assert!(created.id > 0);

    let retrieved = get_post(&db, created.id)
        .await
        .expect("Failed to get post")
        .expect("Post not found");

    assert_eq!(retrieved, created);
    assert_eq!(retrieved.title, "Test Post");
    assert_eq!(retrieved.content, "Hello world");
}

#[tokio::test]
async fn test_get_missing_post_is_none() {
    let (db, _temp_dir) = setup_db().await;
    assert!(get_post(&db, 999).await.unwrap().is_none());
    assert!(get_comment(&db, 999).await.unwrap().is_none());
}

#[tokio::test]
async fn test_post_ids_increase() {
    let (db, _temp_dir) = setup_db().await;

    let mut previous = 0;
    for i in 0..5 {
        let id = create_post(&db, &format!("Post {i}")).await;
        assert!(id > previous);
        previous = id;
    }
}

#[tokio::test]
async fn test_list_posts_newest_first() {
    let (db, _temp_dir) = setup_db().await;

    let first = create_post(&db, "First").await;
    let second = create_post(&db, "Second").await;
    let third = create_post(&db, "Third").await;

    let posts = list_posts(&db).await.unwrap();
    let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![third, second, first]);
}

#[tokio::test]
async fn test_comments_oldest_first() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = create_post(&db, "Post").await;
    let other_post = create_post(&db, "Other").await;

    let a = create_comment(&db, post_id, None, "a").await;
    let b = create_comment(&db, post_id, Some(a), "b").await;
    create_comment(&db, other_post, None, "elsewhere").await;
    let c = create_comment(&db, post_id, None, "c").await;

    let comments = list_comments_for_post(&db, post_id).await.unwrap();
    let ids: Vec<i64> = comments.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![a, b, c]);
    assert_eq!(comments[1].parent_id, Some(a));
    assert!(comments.iter().all(|c| c.post_id == post_id));
}

#[tokio::test]
async fn test_comment_for_missing_post_rejected() {
    let (db, _temp_dir) = setup_db().await;

    let new_comment = NewComment {
        post_id: 42,
        parent_id: None,
        author: "tester".to_string(),
        content: "orphan".to_string(),
    };
    let result = insert_comment(&db, &new_comment).await;
    assert!(matches!(result, Err(DbError::Sqlx(_))));
}

#[tokio::test]
async fn test_storage_rejects_reply_to_reply() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = create_post(&db, "Post").await;
    let root = create_comment(&db, post_id, None, "root").await;
    let reply = create_comment(&db, post_id, Some(root), "reply").await;

    let nested = NewComment {
        post_id,
        parent_id: Some(reply),
        author: "tester".to_string(),
        content: "too deep".to_string(),
    };
    let err = insert_comment(&db, &nested).await.unwrap_err();
    assert!(err.to_string().contains("only one level of nesting allowed"));
    assert_eq!(list_comments_for_post(&db, post_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_storage_rejects_cross_post_parent() {
    let (db, _temp_dir) = setup_db().await;
    let post_a = create_post(&db, "A").await;
    let post_b = create_post(&db, "B").await;
    let root_a = create_comment(&db, post_a, None, "root").await;

    let cross = NewComment {
        post_id: post_b,
        parent_id: Some(root_a),
        author: "tester".to_string(),
        content: "wrong thread".to_string(),
    };
    let err = insert_comment(&db, &cross).await.unwrap_err();
    assert!(err.to_string().contains("different post"));
}

#[tokio::test]
async fn test_delete_post_cascades_to_comments() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = create_post(&db, "Doomed").await;
    let keep_id = create_post(&db, "Kept").await;

    let root = create_comment(&db, post_id, None, "root").await;
    let reply = create_comment(&db, post_id, Some(root), "reply").await;
    let kept_comment = create_comment(&db, keep_id, None, "stays").await;

    assert!(delete_post(&db, post_id).await.unwrap());
    assert!(!delete_post(&db, post_id).await.unwrap());

    assert!(get_comment(&db, root).await.unwrap().is_none());
    assert!(get_comment(&db, reply).await.unwrap().is_none());
    assert!(get_comment(&db, kept_comment).await.unwrap().is_some());

    let orphans: Option<(i64,)> = db
        .fetch_one(
            "SELECT COUNT(*) FROM comments WHERE post_id NOT IN (SELECT id FROM posts)",
            &[],
        )
        .await
        .unwrap();
    assert_eq!(orphans, Some((0,)));
}

#[tokio::test]
async fn test_delete_comment_removes_replies() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = create_post(&db, "Post").await;
    let root = create_comment(&db, post_id, None, "root").await;
    create_comment(&db, post_id, Some(root), "reply one").await;
    create_comment(&db, post_id, Some(root), "reply two").await;
    let other_root = create_comment(&db, post_id, None, "other").await;

    assert!(delete_comment(&db, root).await.unwrap());

    let remaining = list_comments_for_post(&db, post_id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, other_root);
}

#[tokio::test]
async fn test_query_primitives() {
    let (db, _temp_dir) = setup_db().await;

    let outcome = db
        .execute(
            "INSERT INTO posts (title, content, created_at) VALUES (?, ?, ?)",
            &[
                Param::from("Raw"),
                Param::from("Inserted directly"),
                Param::from("2024-01-01T00:00:00.000Z"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(outcome.rows_affected, 1);
    assert!(outcome.inserted_id > 0);

    let titles: Vec<(String,)> = db
        .fetch_many("SELECT title FROM posts WHERE id = ?", &[outcome.inserted_id.into()])
        .await
        .unwrap();
    assert_eq!(titles, vec![("Raw".to_string(),)]);

    let missing: Option<(String,)> = db
        .fetch_one("SELECT title FROM posts WHERE id = ?", &[Param::from(-1_i64)])
        .await
        .unwrap();
    assert!(missing.is_none());

    let updated = db
        .execute("UPDATE posts SET title = ? WHERE id = ?", &["Renamed".into(), Param::Null])
        .await
        .unwrap();
    assert_eq!(updated.rows_affected, 0);
}
