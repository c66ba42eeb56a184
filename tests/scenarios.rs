mod common;

use std::time::Duration;

use common::{eventually, local_client, settle, sign_up_form};
use echoes::{
    engagement::{EngagementState, ToggleError, ToggleRejected},
    error::EchoError,
    media::{MediaRejection, MediaUpload},
    model::ProfileUpdate,
    sync::Redirect,
};
use uuid::Uuid;

#[tokio::test]
async fn post_like_and_unlike_an_echo() {
    let harness = local_client().await;
    let client = &harness.client;

    let alice = client.sign_up(sign_up_form("alice")).await.unwrap();
    assert_eq!(client.identity().map(|me| me.id), Some(alice.id));

    let post = client.post_echo("hello #rust", None).await.unwrap();
    assert_eq!(post.author_id, alice.id);

    let feed = client.refresh_home().await.unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].post.id, post.id);
    assert_eq!(feed[0].author.username, "alice");
    assert_eq!(feed[0].like_count, 0);
    assert!(!feed[0].liked_by_current_user);

    let view = client.like(post.id).await.unwrap();
    assert_eq!(view.state, EngagementState::Liked);
    assert_eq!(view.like_count, 1);

    // a second like for the same pair is refused, not double counted
    assert!(matches!(
        client.like(post.id).await,
        Err(ToggleError::Rejected(ToggleRejected::Unchanged(_)))
    ));

    let feed = client.refresh_home().await.unwrap();
    assert_eq!(feed[0].like_count, 1);
    assert!(feed[0].liked_by_current_user);

    let view = client.unlike(post.id).await.unwrap();
    assert_eq!(view.state, EngagementState::Unliked);
    assert_eq!(view.like_count, 0);
    assert_eq!(client.refresh_home().await.unwrap()[0].like_count, 0);
}

#[tokio::test]
async fn invalid_content_is_never_stored() {
    let harness = local_client().await;
    let client = &harness.client;
    client.sign_up(sign_up_form("bob")).await.unwrap();

    for content in ["".to_owned(), "x".repeat(281)] {
        assert!(matches!(client.post_echo(&content, None).await, Err(EchoError::Validation(_))));
    }
    assert!(client.refresh_home().await.unwrap().is_empty());

    let exactly = "y".repeat(280);
    client.post_echo(&exactly, None).await.unwrap();
    assert_eq!(client.refresh_home().await.unwrap()[0].post.content, exactly);
}

#[tokio::test]
async fn missing_profile_is_none() {
    let harness = local_client().await;
    let client = &harness.client;
    client.sign_up(sign_up_form("carol")).await.unwrap();

    assert_eq!(client.profile(Uuid::new_v4()).await.unwrap(), None);
}

#[tokio::test]
async fn taken_username_undoes_the_sign_up() {
    let harness = local_client().await;
    let client = &harness.client;
    client.sign_up(sign_up_form("dave")).await.unwrap();

    let mut form = sign_up_form("erin");
    form.username = "dave".into();
    let err = client.sign_up(form).await.unwrap_err();
    assert_eq!(err, EchoError::Conflict("username dave is already taken".into()));

    eventually(|| client.identity().is_none()).await;
    let redirect = tokio::time::timeout(Duration::from_secs(1), client.next_redirect())
        .await
        .unwrap();
    assert_eq!(redirect, Some(Redirect::SignIn));
}

#[tokio::test]
async fn signed_out_users_cannot_write() {
    let harness = local_client().await;
    let client = &harness.client;
    client.sign_up(sign_up_form("frank")).await.unwrap();
    let post = client.post_echo("before sign out", None).await.unwrap();
    client.refresh_home().await.unwrap();

    client.sign_out().await.unwrap();
    assert_eq!(client.identity(), None);
    assert_eq!(client.post_echo("after", None).await.unwrap_err(), EchoError::Unauthenticated);
    assert!(matches!(
        client.like(post.id).await,
        Err(ToggleError::Rejected(ToggleRejected::SignedOut))
    ));

    client.sign_in("frank@example.com", "hunter22").await.unwrap();
    settle().await;
    client.refresh_home().await.unwrap();
    assert_eq!(client.like(post.id).await.unwrap().like_count, 1);
}

#[tokio::test]
async fn profiles_can_be_edited() {
    let harness = local_client().await;
    let client = &harness.client;
    let me = client.sign_up(sign_up_form("grace")).await.unwrap();

    let updated = client
        .update_profile(ProfileUpdate {
            bio: Some("compilers".into()),
            ..ProfileUpdate::default()
        })
        .await
        .unwrap();
    assert_eq!(updated.bio.as_deref(), Some("compilers"));
    assert_eq!(client.own_profile().await.unwrap(), Some(updated));

    client.post_echo("mine", None).await.unwrap();
    let echoes = client.refresh_profile_feed(me.id).await.unwrap();
    assert_eq!(echoes.len(), 1);
    assert!(client.refresh_profile_feed(Uuid::new_v4()).await.unwrap().is_empty());
}

#[tokio::test]
async fn uploaded_images_can_be_attached() {
    let harness = local_client().await;
    let client = &harness.client;
    let me = client.sign_up(sign_up_form("heidi")).await.unwrap();

    let png = MediaUpload { content_type: "image/png".into(), bytes: vec![0x89, b'P', b'N', b'G'] };
    let url = client.upload_media(me.id, png).await.unwrap();
    let name = url.strip_prefix("http://echoes.test/media/").unwrap();
    assert!(harness.media_dir.join(name).exists());

    client.post_echo("look", Some(&url)).await.unwrap();
    assert_eq!(client.refresh_home().await.unwrap()[0].post.media_urls, vec![url]);

    let text = MediaUpload { content_type: "text/plain".into(), bytes: b"hi".to_vec() };
    assert_eq!(client.upload_media(me.id, text).await, Err(MediaRejection::WrongType));
}

#[tokio::test]
async fn trending_panels_follow_the_store() {
    let harness = local_client().await;
    let client = &harness.client;
    client.sign_up(sign_up_form("ivan")).await.unwrap();

    eventually(|| client.trending().news.len() == 1).await;

    client.post_echo("#rust and #tokio", None).await.unwrap();
    client.post_echo("#rust again", None).await.unwrap();

    eventually(|| {
        client
            .trending()
            .hashtags
            .first()
            .is_some_and(|top| top.tweet_count == 2)
    })
    .await;
    let trending = client.trending();
    assert_eq!(trending.hashtags[0].name, "rust");
    assert_eq!(trending.hashtags[1].name, "tokio");
    assert_eq!(trending.news[0].title, "Crabs everywhere");
}

#[tokio::test]
async fn signing_back_in_is_not_undone_by_the_earlier_sign_out() {
    let harness = local_client().await;
    let client = &harness.client;
    let me = client.sign_up(sign_up_form("judy")).await.unwrap();

    client.sign_out().await.unwrap();
    client.sign_in("judy@example.com", "hunter22").await.unwrap();
    assert_eq!(client.identity().map(|id| id.id), Some(me.id));

    settle().await;
    assert_eq!(client.identity().map(|id| id.id), Some(me.id));
    // the sign-out redirect went stale when judy signed back in
    assert!(
        tokio::time::timeout(Duration::from_millis(200), client.next_redirect())
            .await
            .is_err()
    );
}
