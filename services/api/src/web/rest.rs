//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Every route sits behind [`require_user`](crate::web::middleware::require_user),
//! which puts the caller's id into the request extensions.

use crate::error::{HttpError, HttpResult};
use crate::web::dto::*;
use crate::web::state::AppState;
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use training_core::{
    chat::{suggest_training_tip, ChatAssistant},
    dashboard::{load_dashboard, load_plan_detail, load_plans},
    planning::{create_plans, delete_plan_cascade},
    propagate::start_plan,
    reconcile::{SessionView, ViewMode},
    Dog, PlanWithDog,
};
use utoipa::OpenApi;
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_dogs_handler,
        create_dog_handler,
        get_dog_handler,
        update_dog_handler,
        delete_dog_handler,
        dog_tip_handler,
        dog_sessions_handler,
        list_plans_handler,
        create_plans_handler,
        get_plan_handler,
        delete_plan_handler,
        start_plan_handler,
        list_steps_handler,
        get_session_view_handler,
        submit_session_handler,
        step_sessions_handler,
        chat_history_handler,
        send_chat_handler,
        dashboard_handler,
    ),
    components(
        schemas(
            DogResponse,
            CreateDogRequest,
            UpdateDogRequest,
            TipResponse,
            StepResponse,
            PlanResponse,
            PlanOverviewResponse,
            PlanGroupsResponse,
            DashboardResponse,
            CreatePlanRequest,
            SessionFormDto,
            SessionResponse,
            SessionViewResponse,
            SubmitSessionResponse,
            ChatMessageResponse,
            SendChatRequest,
        )
    ),
    tags(
        (name = "Dog Training API", description = "Dogs, AI training plans, session logging and the trainer chat.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Helpers
//=========================================================================================

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// The dog, if it exists and belongs to `user_id`.
async fn owned_dog(state: &AppState, user_id: Uuid, dog_id: Uuid) -> HttpResult<Dog> {
    match state.db.get_dog_by_id(dog_id).await? {
        Some(dog) if dog.owner_id == user_id => Ok(dog),
        _ => Err(HttpError::not_found("Dog not found")),
    }
}

/// The plan, if it exists and belongs to `user_id`.
async fn owned_plan(state: &AppState, user_id: Uuid, plan_id: Uuid) -> HttpResult<PlanWithDog> {
    match state.db.get_plan_by_id(plan_id).await? {
        Some(plan) if plan.plan.user_id == user_id => Ok(plan),
        _ => Err(HttpError::not_found("Training plan not found")),
    }
}

//=========================================================================================
// Dogs
//=========================================================================================

/// List the caller's dogs, newest first.
#[utoipa::path(
    get,
    path = "/dogs",
    responses((status = 200, body = [DogResponse])),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn list_dogs_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> HttpResult<impl IntoResponse> {
    let today = today();
    let dogs = state.db.get_dogs_by_owner(user_id).await?;
    let body: Vec<DogResponse> = dogs.into_iter().map(|d| DogResponse::from_dog(d, today)).collect();
    Ok(Json(body))
}

#[utoipa::path(
    post,
    path = "/dogs",
    request_body = CreateDogRequest,
    responses(
        (status = 201, body = DogResponse),
        (status = 400, description = "Missing name")
    ),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn create_dog_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(body): Json<CreateDogRequest>,
) -> HttpResult<impl IntoResponse> {
    let dog = state.db.create_dog(body.into_new_dog(user_id)?).await?;
    info!("Dog {} added for user {}", dog.id, user_id);
    Ok((StatusCode::CREATED, Json(DogResponse::from_dog(dog, today()))))
}

#[utoipa::path(
    get,
    path = "/dogs/{id}",
    responses((status = 200, body = DogResponse), (status = 404)),
    params(
        ("id" = Uuid, Path, description = "Dog id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn get_dog_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(dog_id): Path<Uuid>,
) -> HttpResult<impl IntoResponse> {
    let dog = owned_dog(&state, user_id, dog_id).await?;
    Ok(Json(DogResponse::from_dog(dog, today())))
}

/// Partial update; omitted fields keep their stored values.
#[utoipa::path(
    patch,
    path = "/dogs/{id}",
    request_body = UpdateDogRequest,
    responses((status = 200, body = DogResponse), (status = 400), (status = 404)),
    params(
        ("id" = Uuid, Path, description = "Dog id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn update_dog_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(dog_id): Path<Uuid>,
    Json(body): Json<UpdateDogRequest>,
) -> HttpResult<impl IntoResponse> {
    let update = body.into_update()?;
    owned_dog(&state, user_id, dog_id).await?;
    let dog = state.db.update_dog(dog_id, update).await?;
    Ok(Json(DogResponse::from_dog(dog, today())))
}

/// Deletes the dog together with its plans, steps and sessions.
#[utoipa::path(
    delete,
    path = "/dogs/{id}",
    responses((status = 204), (status = 404)),
    params(
        ("id" = Uuid, Path, description = "Dog id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn delete_dog_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(dog_id): Path<Uuid>,
) -> HttpResult<impl IntoResponse> {
    owned_dog(&state, user_id, dog_id).await?;
    state.db.delete_dog(dog_id).await?;
    info!("Dog {} deleted", dog_id);
    Ok(StatusCode::NO_CONTENT)
}

/// A short positive-reinforcement tip for the dog.
#[utoipa::path(
    get,
    path = "/dogs/{id}/tip",
    responses((status = 200, body = TipResponse), (status = 404), (status = 500)),
    params(
        ("id" = Uuid, Path, description = "Dog id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn dog_tip_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(dog_id): Path<Uuid>,
) -> HttpResult<impl IntoResponse> {
    let dog = owned_dog(&state, user_id, dog_id).await?;
    let tip = suggest_training_tip(state.chat_model.as_ref(), &dog, today()).await?;
    Ok(Json(TipResponse { tip }))
}

#[utoipa::path(
    get,
    path = "/dogs/{id}/sessions",
    responses((status = 200, body = [SessionResponse]), (status = 404)),
    params(
        ("id" = Uuid, Path, description = "Dog id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn dog_sessions_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(dog_id): Path<Uuid>,
) -> HttpResult<impl IntoResponse> {
    owned_dog(&state, user_id, dog_id).await?;
    let sessions = state.db.get_sessions_for_dog(dog_id).await?;
    let body: Vec<SessionResponse> = sessions.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

//=========================================================================================
// Plans
//=========================================================================================

/// All plans of the caller grouped by their displayed status.
#[utoipa::path(
    get,
    path = "/plans",
    responses((status = 200, body = PlanGroupsResponse)),
    params(
        PlansQuery,
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn list_plans_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<PlansQuery>,
) -> HttpResult<impl IntoResponse> {
    let email = query.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
    let groups = load_plans(state.db.as_ref(), user_id, email).await?;
    Ok(Json(PlanGroupsResponse::from(groups)))
}

/// Generates one plan per selected dog through the language model.
#[utoipa::path(
    post,
    path = "/plans",
    request_body = CreatePlanRequest,
    responses(
        (status = 201, body = [PlanResponse]),
        (status = 422, description = "Invalid request"),
        (status = 502, description = "The model failed or returned an unusable plan")
    ),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn create_plans_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(body): Json<CreatePlanRequest>,
) -> HttpResult<impl IntoResponse> {
    let request = body.into_core()?;
    let created = create_plans(
        state.db.as_ref(),
        state.planner.as_ref(),
        user_id,
        &request,
        today(),
    )
    .await?;
    let body: Vec<PlanResponse> = created.into_iter().map(Into::into).collect();
    Ok((StatusCode::CREATED, Json(body)))
}

#[utoipa::path(
    get,
    path = "/plans/{id}",
    responses((status = 200, body = PlanOverviewResponse), (status = 404)),
    params(
        ("id" = Uuid, Path, description = "Plan id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn get_plan_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(plan_id): Path<Uuid>,
) -> HttpResult<impl IntoResponse> {
    owned_plan(&state, user_id, plan_id).await?;
    let overview = load_plan_detail(state.db.as_ref(), plan_id)
        .await?
        .ok_or_else(|| HttpError::not_found("Training plan not found"))?;
    Ok(Json(PlanOverviewResponse::from(overview)))
}

#[utoipa::path(
    delete,
    path = "/plans/{id}",
    responses((status = 204), (status = 404)),
    params(
        ("id" = Uuid, Path, description = "Plan id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn delete_plan_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(plan_id): Path<Uuid>,
) -> HttpResult<impl IntoResponse> {
    owned_plan(&state, user_id, plan_id).await?;
    delete_plan_cascade(state.db.as_ref(), plan_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Moves a `not_started` plan to `in_progress`.
#[utoipa::path(
    post,
    path = "/plans/{id}/start",
    responses(
        (status = 200, body = PlanResponse),
        (status = 404),
        (status = 409, description = "The plan is already completed")
    ),
    params(
        ("id" = Uuid, Path, description = "Plan id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn start_plan_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(plan_id): Path<Uuid>,
) -> HttpResult<impl IntoResponse> {
    let PlanWithDog { plan, dog_name } = owned_plan(&state, user_id, plan_id).await?;
    let plan = start_plan(state.db.as_ref(), &plan).await?;
    Ok(Json(PlanResponse::from(PlanWithDog { plan, dog_name })))
}

#[utoipa::path(
    get,
    path = "/plans/{id}/steps",
    responses((status = 200, body = [StepResponse]), (status = 404)),
    params(
        ("id" = Uuid, Path, description = "Plan id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn list_steps_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(plan_id): Path<Uuid>,
) -> HttpResult<impl IntoResponse> {
    owned_plan(&state, user_id, plan_id).await?;
    let steps = state.db.get_steps_for_plan(plan_id).await?;
    let body: Vec<StepResponse> = steps.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

//=========================================================================================
// Training Sessions
//=========================================================================================

async fn open_session_view(
    state: &AppState,
    user_id: Uuid,
    plan_id: Uuid,
    index: usize,
) -> HttpResult<SessionView> {
    let plan = owned_plan(state, user_id, plan_id).await?;
    let steps = state.db.get_steps_for_plan(plan_id).await?;
    let mut view = SessionView::new(plan_id, plan.plan.dog_id, steps, Some(index));
    view.activate(state.db.as_ref(), index).await?;
    Ok(view)
}

/// The session screen for one step: read-only when a session is already recorded.
#[utoipa::path(
    get,
    path = "/plans/{id}/steps/{index}/session",
    responses((status = 200, body = SessionViewResponse), (status = 404)),
    params(
        ("id" = Uuid, Path, description = "Plan id"),
        ("index" = usize, Path, description = "Zero-based position of the step in the plan"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn get_session_view_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path((plan_id, index)): Path<(Uuid, usize)>,
) -> HttpResult<impl IntoResponse> {
    let view = open_session_view(&state, user_id, plan_id, index).await?;
    Ok(Json(SessionViewResponse::from(view)))
}

/// Records a session for the step, marks it completed and completes the plan
/// when it was the last open step. Pass `edit=true` to supersede a recorded session.
#[utoipa::path(
    post,
    path = "/plans/{id}/steps/{index}/session",
    request_body = SessionFormDto,
    responses(
        (status = 201, body = SubmitSessionResponse),
        (status = 404),
        (status = 409, description = "A session is already recorded and edit mode was not requested"),
        (status = 422, description = "Field validation errors")
    ),
    params(
        ("id" = Uuid, Path, description = "Plan id"),
        ("index" = usize, Path, description = "Zero-based position of the step in the plan"),
        SubmitSessionQuery,
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn submit_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path((plan_id, index)): Path<(Uuid, usize)>,
    Query(query): Query<SubmitSessionQuery>,
    Json(body): Json<SessionFormDto>,
) -> HttpResult<impl IntoResponse> {
    let form = body.into_form()?;
    let mut view = open_session_view(&state, user_id, plan_id, index).await?;
    if query.edit && view.mode == ViewMode::ReadOnly {
        view.toggle_edit()?;
    }
    view.form = form;
    let outcome = view.submit(state.db.as_ref(), Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(SubmitSessionResponse::from(outcome))))
}

/// Every recorded session of a step, newest first.
#[utoipa::path(
    get,
    path = "/steps/{id}/sessions",
    responses((status = 200, body = [SessionResponse])),
    params(
        ("id" = Uuid, Path, description = "Step id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn step_sessions_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(step_id): Path<Uuid>,
) -> HttpResult<impl IntoResponse> {
    let (sessions, dogs) = tokio::try_join!(
        state.db.get_sessions_for_step(step_id),
        state.db.get_dogs_by_owner(user_id)
    )?;
    let own_dogs: HashSet<Uuid> = dogs.iter().map(|d| d.id).collect();
    let body: Vec<SessionResponse> = sessions
        .into_iter()
        .filter(|s| own_dogs.contains(&s.dog_id))
        .map(Into::into)
        .collect();
    Ok(Json(body))
}

//=========================================================================================
// Chat and Dashboard
//=========================================================================================

#[utoipa::path(
    get,
    path = "/chat",
    responses((status = 200, body = [ChatMessageResponse])),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn chat_history_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> HttpResult<impl IntoResponse> {
    let history = state.db.get_chat_history(user_id).await?;
    let body: Vec<ChatMessageResponse> = history.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

/// Sends a message to the trainer assistant. Model failures come back as
/// fallback text in `ai_response`, not as errors.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = SendChatRequest,
    responses(
        (status = 201, body = ChatMessageResponse),
        (status = 400, description = "Empty message")
    ),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn send_chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(body): Json<SendChatRequest>,
) -> HttpResult<impl IntoResponse> {
    let assistant = ChatAssistant::new(state.db.as_ref(), state.chat_model.as_ref());
    let stored = assistant.send_message(user_id, &body.message, today()).await?;
    Ok((StatusCode::CREATED, Json(ChatMessageResponse::from(stored))))
}

/// Active plans with their progress and the next step to train.
#[utoipa::path(
    get,
    path = "/dashboard",
    responses((status = 200, body = DashboardResponse)),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> HttpResult<impl IntoResponse> {
    let dashboard = load_dashboard(state.db.as_ref(), user_id).await?;
    Ok(Json(DashboardResponse::from(dashboard)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/dogs",
            "/dogs/{id}",
            "/dogs/{id}/tip",
            "/dogs/{id}/sessions",
            "/plans",
            "/plans/{id}",
            "/plans/{id}/start",
            "/plans/{id}/steps",
            "/plans/{id}/steps/{index}/session",
            "/steps/{id}/sessions",
            "/chat",
            "/dashboard",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
    }
}
