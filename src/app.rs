use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{admin, auth, chat, recipes, scan, session};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .merge(auth::router())
                .merge(session::router())
                .merge(scan::router())
                .merge(chat::router())
                .merge(recipes::router())
                .merge(admin::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod app_tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tokio::task::JoinHandle;
    use tower::ServiceExt;

    use super::*;
    use crate::genai::testing::{GatedModel, ScriptedModel};

    const PIXEL: &str = "data:image/png;base64,iVBORw0KGgo=";

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    fn spawn_call(
        app: &Router,
        method: Method,
        uri: &'static str,
        token: &str,
        body: Value,
    ) -> JoinHandle<(StatusCode, Value)> {
        let app = app.clone();
        let token = token.to_string();
        tokio::spawn(async move { call(&app, method, uri, Some(&token), Some(body)).await })
    }

    async fn login(app: &Router, role: &str) -> String {
        let (status, body) = call(
            app,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "ana@example.com", "password": "secret", "role": role })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["access_token"].as_str().unwrap().to_string()
    }

    fn salad() -> String {
        json!({
            "foodName": "Ensalada César",
            "calories": 350.0,
            "protein": 20.0,
            "carbs": 15.0,
            "fat": 25.0,
            "healthScore": 72.0,
            "description": "Lechuga, pollo y aderezo.",
            "advice": "Pide el aderezo aparte.",
            "ingredients": ["lechuga", "pollo"]
        })
        .to_string()
    }

    #[tokio::test]
    async fn health_is_open() {
        let app = build_app(AppState::fake());
        let (status, body) = call(&app, Method::GET, "/api/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn login_rejects_bad_form() {
        let app = build_app(AppState::fake());
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "not-an-email", "password": "x", "role": "USER" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "ana@example.com", "password": "", "role": "USER" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_login_shows_overview_without_model_calls() {
        let model = Arc::new(ScriptedModel::new());
        let app = build_app(AppState::fake_with(model.clone()));
        let token = login(&app, "ADMIN").await;

        let (status, me) = call(&app, Method::GET, "/api/v1/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["view"]["screen"], "admin_dashboard");

        let (status, overview) =
            call(&app, Method::GET, "/api/v1/admin/overview", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(overview["metrics"].as_array().unwrap().len(), 4);
        assert_eq!(overview["users"].as_array().unwrap().len(), 4);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn user_login_lands_on_scan_tab_with_empty_history() {
        let app = build_app(AppState::fake());
        let token = login(&app, "USER").await;

        let (status, dash) =
            call(&app, Method::GET, "/api/v1/dashboard", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dash["view"]["tab"], "scan");
        assert_eq!(dash["history_len"], 0);

        let (status, history) =
            call(&app, Method::GET, "/api/v1/scan/history", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history, json!([]));

        let (status, view) = call(
            &app,
            Method::PUT,
            "/api/v1/dashboard/tab",
            Some(&token),
            Some(json!({ "tab": "recipes" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["tab"], "recipes");
    }

    #[tokio::test]
    async fn wrong_screen_is_forbidden() {
        let app = build_app(AppState::fake());
        let user = login(&app, "USER").await;
        let admin = login(&app, "ADMIN").await;

        let (status, _) =
            call(&app, Method::GET, "/api/v1/admin/overview", Some(&user), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(&app, Method::GET, "/api/v1/chat", Some(&admin), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(&app, Method::GET, "/api/v1/scan", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn failed_analysis_keeps_preview_and_reports_error() {
        let model = Arc::new(ScriptedModel::new().fail(503, "overloaded"));
        let app = build_app(AppState::fake_with(model.clone()));
        let token = login(&app, "USER").await;

        let (status, scan) = call(
            &app,
            Method::POST,
            "/api/v1/scan",
            Some(&token),
            Some(json!({ "image": PIXEL })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(scan["is_loading"], false);
        assert_eq!(scan["image_preview"], PIXEL);
        assert_eq!(
            scan["error"],
            "No pudimos analizar la imagen. Intenta con una foto más clara."
        );
        assert!(scan["data"].is_null());
        assert_eq!(model.calls(), 1);

        let (_, history) =
            call(&app, Method::GET, "/api/v1/scan/history", Some(&token), None).await;
        assert_eq!(history, json!([]));
    }

    #[tokio::test]
    async fn successful_analysis_fills_data_history_and_summary() {
        let model = Arc::new(ScriptedModel::new().reply_text(salad()));
        let app = build_app(AppState::fake_with(model));
        let token = login(&app, "USER").await;

        let (status, scan) = call(
            &app,
            Method::POST,
            "/api/v1/scan",
            Some(&token),
            Some(json!({ "image": PIXEL })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(scan["error"].is_null());
        assert_eq!(scan["data"]["foodName"], "Ensalada César");
        assert_eq!(scan["macros"].as_array().unwrap().len(), 3);

        let (_, history) =
            call(&app, Method::GET, "/api/v1/scan/history", Some(&token), None).await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["time_ago"], "Ahora");

        let (_, dash) = call(&app, Method::GET, "/api/v1/dashboard", Some(&token), None).await;
        assert_eq!(dash["today"]["calories"], 350.0);
        assert_eq!(dash["today"]["analyses"], 1);

        let (status, reset) = call(&app, Method::DELETE, "/api/v1/scan", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(reset["data"].is_null());
        assert!(reset["image_preview"].is_null());
    }

    #[tokio::test]
    async fn non_image_upload_is_rejected_before_the_model() {
        let model = Arc::new(ScriptedModel::new());
        let app = build_app(AppState::fake_with(model.clone()));
        let token = login(&app, "USER").await;

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/scan",
            Some(&token),
            Some(json!({ "image": "data:text/plain;base64,aGVsbG8=" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn chat_hides_profile_block_and_accumulates_profile() {
        let fenced = "Perfecto, lo tendré en cuenta.\n```json\n{\"user_profile_update\": {\"alergias\": [\"gluten\"]}}\n```";
        let envelope = json!({
            "reply": "Anotado.",
            "user_profile_update": { "allergies": ["maní"], "edad": 34 }
        })
        .to_string();
        let model = Arc::new(ScriptedModel::new().reply_text(fenced).reply_text(envelope));
        let app = build_app(AppState::fake_with(model.clone()));
        let token = login(&app, "USER").await;

        let (status, first) = call(
            &app,
            Method::POST,
            "/api/v1/chat",
            Some(&token),
            Some(json!({ "text": "Soy celíaca" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["reply"]["text"], "Perfecto, lo tendré en cuenta.");
        assert_eq!(first["profile"]["allergies"], json!(["gluten"]));

        let (_, second) = call(
            &app,
            Method::POST,
            "/api/v1/chat",
            Some(&token),
            Some(json!({ "text": "También el maní, tengo 34" })),
        )
        .await;
        assert_eq!(second["reply"]["text"], "Anotado.");
        assert_eq!(second["profile"]["allergies"], json!(["gluten", "maní"]));
        assert_eq!(second["profile"]["age"], 34);

        let (_, transcript) = call(&app, Method::GET, "/api/v1/chat", Some(&token), None).await;
        let messages = transcript["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[3]["role"], "assistant");

        // The second turn carries the earlier exchange as history.
        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].contents.len() > requests[0].contents.len());
    }

    #[tokio::test]
    async fn chat_failure_shows_fallback_and_keeps_user_message() {
        let model = Arc::new(ScriptedModel::new().fail(500, "boom"));
        let app = build_app(AppState::fake_with(model));
        let token = login(&app, "USER").await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/chat",
            Some(&token),
            Some(json!({ "text": "Hola" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["reply"]["text"],
            "Lo siento, tuve un problema al procesar tu mensaje. Intenta de nuevo."
        );

        let (_, transcript) = call(&app, Method::GET, "/api/v1/chat", Some(&token), None).await;
        assert_eq!(transcript["messages"][0]["text"], "Hola");
        assert_eq!(transcript["messages"].as_array().unwrap().len(), 2);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/chat",
            Some(&token),
            Some(json!({ "text": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn recipe_failure_yields_empty_list() {
        let model = Arc::new(ScriptedModel::new().reply_text("not json at all"));
        let app = build_app(AppState::fake_with(model.clone()));
        let token = login(&app, "USER").await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/recipes",
            Some(&token),
            Some(json!({ "preferences": "vegetariano" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["recipes"], json!([]));
        assert_eq!(body["is_generating"], false);
        assert_eq!(model.calls(), 1);

        let (_, stored) = call(&app, Method::GET, "/api/v1/recipes", Some(&token), None).await;
        assert_eq!(stored["is_generating"], false);
    }

    #[tokio::test]
    async fn logout_ends_the_session() {
        let app = build_app(AppState::fake());
        let token = login(&app, "USER").await;

        let (status, body) =
            call(&app, Method::POST, "/api/v1/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["view"]["screen"], "login");

        let (status, _) = call(&app, Method::GET, "/api/v1/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) =
            call(&app, Method::GET, "/api/v1/scan/history", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn pending_analysis_shows_preview_and_loading() {
        let model = Arc::new(GatedModel::new(ScriptedModel::new().reply_text(salad())));
        let app = build_app(AppState::fake_with(model.clone()));
        let token = login(&app, "USER").await;

        let upload = spawn_call(&app, Method::POST, "/api/v1/scan", &token, json!({ "image": PIXEL }));
        model.arrival().await;

        let (status, pending) = call(&app, Method::GET, "/api/v1/scan", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending["is_loading"], true);
        assert_eq!(pending["image_preview"], PIXEL);
        assert!(pending["data"].is_null());
        assert!(pending["error"].is_null());

        model.release(1);
        let (status, done) = upload.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(done["is_loading"], false);
        assert_eq!(done["data"]["foodName"], "Ensalada César");
    }

    #[tokio::test]
    async fn newer_upload_supersedes_pending_one() {
        const SECOND: &str = "data:image/jpeg;base64,iVBORw0KGgo=";
        let model = Arc::new(GatedModel::new(
            ScriptedModel::new().reply_text(salad()).fail(500, "boom"),
        ));
        let app = build_app(AppState::fake_with(model.clone()));
        let token = login(&app, "USER").await;

        let first = spawn_call(&app, Method::POST, "/api/v1/scan", &token, json!({ "image": PIXEL }));
        model.arrival().await;
        let second = spawn_call(&app, Method::POST, "/api/v1/scan", &token, json!({ "image": SECOND }));
        model.arrival().await;
        model.release(2);

        let (first_status, _) = first.await.unwrap();
        let (second_status, second_body) = second.await.unwrap();
        assert_eq!(first_status, StatusCode::OK);
        assert_eq!(second_status, StatusCode::BAD_GATEWAY);
        assert_eq!(second_body["image_preview"], SECOND);

        // The older success must not overwrite the newer failure.
        let (_, scan) = call(&app, Method::GET, "/api/v1/scan", Some(&token), None).await;
        assert_eq!(scan["image_preview"], SECOND);
        assert!(scan["data"].is_null());
        assert!(!scan["error"].is_null());
        let (_, history) =
            call(&app, Method::GET, "/api/v1/scan/history", Some(&token), None).await;
        assert_eq!(history, json!([]));
    }

    #[tokio::test]
    async fn second_recipe_request_conflicts_while_generating() {
        let recipes = json!([{
            "name": "Bowl de quinoa",
            "calories": 480,
            "protein": "22g",
            "carbs": "60g",
            "fat": "14g",
            "prepTime": "20 min",
            "tags": ["vegano"],
            "explanation": "Rica en fibra.",
            "ingredients": ["quinoa", "garbanzos"],
            "instructions": ["Cocer la quinoa.", "Mezclar."]
        }])
        .to_string();
        let model = Arc::new(GatedModel::new(ScriptedModel::new().reply_text(recipes)));
        let app = build_app(AppState::fake_with(model.clone()));
        let token = login(&app, "USER").await;

        let first = spawn_call(
            &app,
            Method::POST,
            "/api/v1/recipes",
            &token,
            json!({ "preferences": "vegano" }),
        );
        model.arrival().await;

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/recipes",
            Some(&token),
            Some(json!({ "preferences": "vegano" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (_, busy) = call(&app, Method::GET, "/api/v1/recipes", Some(&token), None).await;
        assert_eq!(busy["is_generating"], true);

        model.release(1);
        let (status, body) = first.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["recipes"][0]["name"], "Bowl de quinoa");

        let (_, idle) = call(&app, Method::GET, "/api/v1/recipes", Some(&token), None).await;
        assert_eq!(idle["is_generating"], false);
        assert_eq!(idle["recipes"].as_array().unwrap().len(), 1);
        assert_eq!(model.requests().len(), 1);
    }

    #[tokio::test]
    async fn overlapping_chat_turns_see_earlier_profile_update() {
        let first_reply = json!({ "reply": "Anotado.", "user_profile_update": { "age": 30 } });
        let model = Arc::new(GatedModel::new(
            ScriptedModel::new()
                .reply_text(first_reply.to_string())
                .reply_text(r#"{"reply": "Claro."}"#),
        ));
        let app = build_app(AppState::fake_with(model.clone()));
        let token = login(&app, "USER").await;

        let first = spawn_call(&app, Method::POST, "/api/v1/chat", &token, json!({ "text": "Tengo 30" }));
        model.arrival().await;
        let second = spawn_call(&app, Method::POST, "/api/v1/chat", &token, json!({ "text": "¿Qué ceno?" }));
        // Let the second turn queue up behind the first.
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        model.release(1);
        model.arrival().await;
        model.release(1);
        let (first_status, _) = first.await.unwrap();
        let (second_status, body) = second.await.unwrap();
        assert_eq!(first_status, StatusCode::OK);
        assert_eq!(second_status, StatusCode::OK);
        assert_eq!(body["reply"]["text"], "Claro.");

        let requests = model.requests();
        let turn = requests[1].contents.last().unwrap();
        assert!(turn.parts[0].text.as_deref().unwrap().contains("edad 30"));
        assert_eq!(turn.parts[1].text.as_deref(), Some("¿Qué ceno?"));
    }
}
