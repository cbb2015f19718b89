use actix_web::{
    http::header::AUTHORIZATION,
    web::{self, Data},
    App, HttpRequest, HttpResponse, HttpServer,
};
use campus_client::{
    api::{error::ClientError, success::SuccessData},
    cache::{CacheConfig, QueryCache},
    client::RemoteClient,
    configs::{MemorySessionStore, SessionStore},
    modules::{
        investment::model::CommitmentForm,
        startup::service::detail_key,
        user::model::{PremiumPlan, SignInModel},
    },
    mutation::NotificationLevel,
    utils::current_user_id,
    CampusClient,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

struct Backend {
    startup: Mutex<Value>,
    failing_upvotes: AtomicUsize,
    session_expired: AtomicBool,
    bearers: Mutex<Vec<Option<String>>>,
}

impl Backend {
    fn new() -> Data<Backend> {
        Data::new(Backend {
            startup: Mutex::new(json!({
                "_id": "s1",
                "name": "Acme",
                "owner": { "_id": "founder", "name": "Fay" },
                "upvotes": ["u1", { "_id": "u2", "name": "Bo" }],
                "upvoteCount": 2,
                "reviews": [],
            })),
            failing_upvotes: AtomicUsize::new(0),
            session_expired: AtomicBool::new(false),
            bearers: Mutex::new(Vec::new()),
        })
    }

    fn record(&self, req: &HttpRequest) {
        let bearer = req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        self.bearers.lock().unwrap().push(bearer.map(str::to_string));
    }

    fn last_bearer(&self) -> Option<String> {
        self.bearers.lock().unwrap().last().cloned().flatten()
    }
}

fn token_for(user_id: &str) -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    encode(
        &Header::default(),
        &json!({ "id": user_id, "exp": exp }),
        &EncodingKey::from_secret(b"mock-backend"),
    )
    .unwrap()
}

fn user_body(premium: bool) -> Value {
    json!({
        "_id": "u3",
        "name": "Cy",
        "avatar": "https://cdn.example/cy.png",
        "isPremium": premium,
    })
}

async fn login(req: HttpRequest, state: Data<Backend>) -> HttpResponse {
    state.record(&req);
    HttpResponse::Ok().json(
        SuccessData::ok(json!({ "token": token_for("u7"), "user": user_body(false) }))
            .message("Signed in"),
    )
}

async fn me(req: HttpRequest, state: Data<Backend>) -> HttpResponse {
    state.record(&req);
    if state.session_expired.load(Ordering::SeqCst) {
        let body = json!({ "message": "Unauthorized: token expired" });
        return HttpResponse::Unauthorized().json(body);
    }
    HttpResponse::Ok().json(SuccessData::ok(user_body(true)))
}

async fn purchase_premium(req: HttpRequest, state: Data<Backend>) -> HttpResponse {
    state.record(&req);
    HttpResponse::Ok().json(json!({ "token": "rotated-token", "data": user_body(true) }))
}

async fn chat_token(req: HttpRequest, state: Data<Backend>) -> HttpResponse {
    state.record(&req);
    HttpResponse::Ok().json(SuccessData::ok(json!({ "token": "sdk-token" })))
}

async fn friends(req: HttpRequest, state: Data<Backend>) -> HttpResponse {
    state.record(&req);
    HttpResponse::Forbidden().json(json!({ "message": "Forbidden", "error": "TOKEN_INVALID" }))
}

async fn friend_requests(req: HttpRequest, state: Data<Backend>) -> HttpResponse {
    state.record(&req);
    HttpResponse::Ok().json(SuccessData::ok(json!({
        "incoming": [
            null,
            {},
            { "_id": "r1", "sender": { "_id": "u9", "name": "Di" }, "recipient": "u3" }
        ],
        "outgoing": []
    })))
}

async fn commit(req: HttpRequest, state: Data<Backend>) -> HttpResponse {
    state.record(&req);
    HttpResponse::Unauthorized().json(json!({ "message": "Invalid ticket size format" }))
}

async fn startup(req: HttpRequest, state: Data<Backend>) -> HttpResponse {
    state.record(&req);
    HttpResponse::Ok().json(SuccessData::ok(state.startup.lock().unwrap().clone()))
}

/// Upvotes as `u3`, and lets `u4` upvote at the same moment.
async fn upvote(req: HttpRequest, state: Data<Backend>) -> HttpResponse {
    state.record(&req);
    if state.failing_upvotes.load(Ordering::SeqCst) > 0 {
        state.failing_upvotes.fetch_sub(1, Ordering::SeqCst);
        return HttpResponse::InternalServerError().json(json!({ "message": "Upvote failed" }));
    }
    let mut startup = state.startup.lock().unwrap();
    if let Some(upvotes) = startup["upvotes"].as_array_mut() {
        upvotes.push(json!("u3"));
        upvotes.push(json!("u4"));
    }
    let count = startup["upvotes"].as_array().map_or(0, Vec::len);
    startup["upvoteCount"] = json!(count);
    HttpResponse::Ok().json(SuccessData::ok(startup.clone()).message("Upvoted"))
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/auth/login", web::post().to(login))
        .route("/users/me", web::get().to(me))
        .route("/payments/premium", web::post().to(purchase_premium))
        .route("/stream/token", web::get().to(chat_token))
        .route("/friends", web::get().to(friends))
        .route("/friends/requests", web::get().to(friend_requests))
        .route("/investments", web::post().to(commit))
        .route("/startups/{id}", web::get().to(startup))
        .route("/startups/{id}/upvote", web::post().to(upvote));
}

async fn start(state: Data<Backend>) -> String {
    let server = HttpServer::new(move || {
        App::new().app_data(state.clone()).service(web::scope("/api").configure(routes))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();
    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());
    format!("http://{addr}/api")
}

async fn connect_with(
    state: Data<Backend>,
    token: Option<String>,
    cache: QueryCache,
) -> (CampusClient, Arc<MemorySessionStore>) {
    let base_url = start(state).await;
    let session = Arc::new(match token {
        Some(token) => MemorySessionStore::with_token(token),
        None => MemorySessionStore::new(),
    });
    let remote = RemoteClient::new(reqwest::Client::new(), base_url, session.clone());
    (CampusClient::new(remote, cache), session)
}

async fn connect(
    state: Data<Backend>,
    token: Option<String>,
) -> (CampusClient, Arc<MemorySessionStore>) {
    let cache = QueryCache::new(CacheConfig { auto_refetch: false, ..Default::default() });
    connect_with(state, token, cache).await
}

#[actix_web::test]
async fn validation_error_on_401_keeps_the_session() {
    let state = Backend::new();
    let token = token_for("u3");
    let (client, session) = connect(state.clone(), Some(token.clone())).await;

    let form = CommitmentForm { amount: 10.0, milestone: None, deadline: None };
    let err = client.investments.commit("s1", form).await.unwrap_err();

    assert!(matches!(err, ClientError::Validation { status: Some(401), .. }));
    assert_eq!(err.user_message(), "Invalid ticket size format");
    assert_eq!(state.last_bearer(), Some(format!("Bearer {token}")));
    assert_eq!(session.load().await.unwrap(), Some(token));
}

#[actix_web::test]
async fn expired_token_on_401_clears_the_session() {
    let state = Backend::new();
    state.session_expired.store(true, Ordering::SeqCst);
    let (client, session) = connect(state.clone(), Some(token_for("u3"))).await;

    let err = client.users.profile().await.unwrap_err();

    assert!(err.is_authentication());
    assert_eq!(session.load().await.unwrap(), None);
}

#[actix_web::test]
async fn structured_code_on_403_clears_the_session() {
    let state = Backend::new();
    let (client, session) = connect(state, Some(token_for("u3"))).await;

    let err = client.friends.get_friends().await.unwrap_err();

    assert!(matches!(err, ClientError::Authentication { status: Some(403), .. }));
    assert_eq!(session.load().await.unwrap(), None);
}

#[actix_web::test]
async fn sign_in_token_is_stored_and_sent_afterwards() {
    let state = Backend::new();
    let (client, session) = connect(state.clone(), None).await;

    client
        .users
        .sign_in(SignInModel { email: "cy@example.com".into(), password: "secret1".into() })
        .await
        .unwrap();
    assert_eq!(state.last_bearer(), None);
    assert_eq!(current_user_id(session.as_ref()).await.unwrap(), "u7");

    let stored = session.load().await.unwrap().unwrap();
    client.startups.get_startup("s1").await.unwrap();
    assert_eq!(state.last_bearer(), Some(format!("Bearer {stored}")));
}

#[actix_web::test]
async fn top_level_token_rotates_the_session() {
    let state = Backend::new();
    let (client, session) = connect(state, Some(token_for("u3"))).await;
    client.users.profile().await.unwrap();

    let user = client.users.purchase_premium(PremiumPlan::Monthly).await.unwrap();

    assert!(user.is_premium);
    assert_eq!(session.load().await.unwrap().as_deref(), Some("rotated-token"));
}

#[actix_web::test]
async fn chat_token_never_replaces_the_session() {
    let state = Backend::new();
    let token = token_for("u3");
    let (client, session) = connect(state, Some(token.clone())).await;

    let chat = client.users.chat_session().await.unwrap();

    assert_eq!(chat.token, "sdk-token");
    assert_eq!(chat.user_id, "u3");
    assert_eq!(chat.display_name, "Cy");
    assert_eq!(chat.avatar_url.as_deref(), Some("https://cdn.example/cy.png"));
    assert_eq!(session.load().await.unwrap(), Some(token));
}

#[actix_web::test]
async fn deleted_relations_never_reach_callers() {
    let state = Backend::new();
    let (client, _session) = connect(state, Some(token_for("u3"))).await;

    let requests = client.friends.get_friend_requests().await.unwrap();

    assert_eq!(requests.incoming.len(), 1);
    assert_eq!(requests.incoming[0].sender.id(), "u9");
}

#[actix_web::test]
async fn unreachable_backend_is_a_network_error() {
    let session = Arc::new(MemorySessionStore::with_token(token_for("u3")));
    let remote =
        RemoteClient::new(reqwest::Client::new(), "http://127.0.0.1:1/api", session.clone());
    let client = CampusClient::new(remote, QueryCache::default());

    let err = client.startups.get_startup("s1").await.unwrap_err();

    assert!(matches!(err, ClientError::Network(_)));
    assert!(session.load().await.unwrap().is_some());
}

#[actix_web::test]
async fn upvote_fails_rolls_back_then_succeeds_and_reconciles() {
    let state = Backend::new();
    let (client, _session) = connect(state.clone(), Some(token_for("u3"))).await;
    let mut notes = client.mutations.notifications();

    let startup = client.startups.get_startup("s1").await.unwrap();
    assert_eq!(startup.upvote_count(), 2);

    state.failing_upvotes.store(1, Ordering::SeqCst);
    let err = client.startups.toggle_upvote("s1").await.unwrap_err();
    assert!(matches!(err, ClientError::Server { status: 500, .. }));
    let note = notes.try_recv().unwrap();
    assert_eq!((note.level, note.message.as_str()), (NotificationLevel::Error, "Upvote failed"));

    let cached = client.startups.cached_startup("s1").unwrap().unwrap();
    assert_eq!(cached.upvote_count(), 2);
    assert!(!cached.has_upvoted("u3"));

    client.startups.toggle_upvote("s1").await.unwrap();
    let cached = client.startups.cached_startup("s1").unwrap().unwrap();
    assert_eq!(cached.upvote_count(), 3);
    assert!(cached.has_upvoted("u3"));
    assert!(client.cache().is_stale(&detail_key("s1")));

    let reconciled = client.startups.get_startup("s1").await.unwrap();
    let ids: Vec<&str> = reconciled.upvotes.iter().map(|u| u.id()).collect();
    assert_eq!(ids, vec!["u1", "u2", "u3", "u4"]);
    assert_eq!(reconciled.upvote_count(), 4);
}

#[actix_web::test]
async fn confirmed_upvote_is_reconciled_without_another_read() {
    let state = Backend::new();
    let (client, _session) =
        connect_with(state.clone(), Some(token_for("u3")), QueryCache::default()).await;
    client.startups.get_startup("s1").await.unwrap();

    client.startups.toggle_upvote("s1").await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while client.cache().is_stale(&detail_key("s1")) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let cached = client.startups.cached_startup("s1").unwrap().unwrap();
    let ids: Vec<&str> = cached.upvotes.iter().map(|u| u.id()).collect();
    assert_eq!(ids, vec!["u1", "u2", "u3", "u4"]);
    assert_eq!(cached.upvote_count(), 4);
}

#[actix_web::test]
async fn ids_cannot_escape_their_path_segment() {
    let state = Backend::new();
    let (client, _session) = connect(state.clone(), Some(token_for("u3"))).await;

    let err = client.startups.get_startup("../users/me").await.unwrap_err();
    assert!(matches!(err, ClientError::Validation { status: None, .. }));
    let err = client.friends.remove_friend("u9?hard=true").await.unwrap_err();
    assert!(matches!(err, ClientError::Validation { .. }));

    assert!(state.bearers.lock().unwrap().is_empty());
}
