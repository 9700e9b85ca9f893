use askama::Template;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use uuid::Uuid;

use crate::api::forms::MultipartForm;
use crate::api::middleware::session::AppState;
use crate::error::{ActionResponse, AppError, Result};
use crate::models::event::{
    event_category_from_form, event_type_from_form, Event, EventData, EventFilter, EventMedia,
    EventMetrics, EventVolunteerRole, VolunteerRoleData, STATUS_DRAFT, STATUS_PUBLISHED,
};
use crate::services::description::{distribute_description, DescriptionSlots};
use crate::services::storage::MediaStore;

const UPLOAD_ENTITY: &str = "events";
const DEFAULT_CAPACITY: i32 = 50;

#[derive(Template)]
#[template(path = "events/show.html")]
struct ShowEventTemplate {
    name: String,
    date_label: String,
    time_label: String,
    location_label: String,
    image: Option<String>,
    top: Option<String>,
    side: Option<String>,
    bottom: Vec<String>,
    tags: Vec<String>,
    contact_person: Option<String>,
    contact_image: Option<String>,
    contact_email: Option<String>,
    contact_phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: Event,
    pub tags: Vec<String>,
    pub volunteer_roles: Vec<EventVolunteerRole>,
    pub description_slots: DescriptionSlots,
}

fn non_empty_slot(slots: &DescriptionSlots, index: usize) -> Option<String> {
    slots
        .get(index)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// "Sunday, March 9, 2025", or a range when the event spans several days
fn date_label(start: NaiveDate, end: NaiveDate) -> String {
    let format = "%A, %B %-d, %Y";
    if end > start {
        format!("{} – {}", start.format(format), end.format(format))
    } else {
        start.format(format).to_string()
    }
}

/// "9:30 AM - 11:00 AM"
fn time_label(start: NaiveTime, end: NaiveTime) -> String {
    format!("{} - {}", start.format("%-I:%M %p"), end.format("%-I:%M %p"))
}

fn location_label(event: &Event) -> String {
    if event.is_virtual && event.location.is_empty() {
        return "Online".to_string();
    }

    [
        Some(event.location.as_str()),
        event.room_building.as_deref(),
        event.full_address.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(", ")
}

impl ShowEventTemplate {
    fn new(event: Event, tags: Vec<String>) -> Self {
        let slots = distribute_description(Some(&event.description));
        let bottom = (2..slots.slots().len())
            .filter_map(|index| non_empty_slot(&slots, index))
            .collect();

        Self {
            date_label: date_label(event.start_date, event.end_date),
            time_label: time_label(event.start_time, event.end_time),
            location_label: location_label(&event),
            top: non_empty_slot(&slots, 0),
            side: non_empty_slot(&slots, 1),
            bottom,
            tags,
            name: event.name,
            image: event.image_path,
            contact_person: event.contact_person,
            contact_image: event.contact_person_image,
            contact_email: event.contact_email,
            contact_phone: event.contact_phone,
        }
    }
}

/// Builds event fields from the admin form
fn event_data_from_form(form: &MultipartForm) -> Result<EventData> {
    form.require(&["eventName", "startDate", "startTime", "endDate", "endTime"])?;

    let start_date = form
        .date("startDate")?
        .ok_or_else(|| AppError::validation("Start date is required"))?;
    let end_date = form
        .date("endDate")?
        .ok_or_else(|| AppError::validation("End date is required"))?;
    let start_time = form
        .time("startTime")?
        .ok_or_else(|| AppError::validation("Start time is required"))?;
    let end_time = form
        .time("endTime")?
        .ok_or_else(|| AppError::validation("End time is required"))?;

    if (end_date, end_time) < (start_date, start_time) {
        return Err(AppError::validation("Event cannot end before it starts"));
    }

    let location = match form.text("eventLocation") {
        Some("Other") => form.string("eventLocationCustom"),
        other => other.map(str::to_string),
    };

    let status = if form.text("status") == Some(STATUS_DRAFT) {
        STATUS_DRAFT
    } else {
        STATUS_PUBLISHED
    };

    Ok(EventData {
        name: form.string("eventName").unwrap_or_default(),
        event_type: event_type_from_form(form.text("eventType").unwrap_or_default()).to_string(),
        type_other: form.string("eventTypeOther"),
        category: event_category_from_form(form.text("eventCategory").unwrap_or_default())
            .to_string(),
        category_other: form.string("eventCategoryOther"),
        description: form.string("eventDescription").unwrap_or_default(),
        start_date,
        start_time,
        end_date,
        end_time,
        is_recurring: form.flag("recurringEvent"),
        location: location.unwrap_or_default(),
        room_building: form.string("roomBuilding"),
        full_address: form.string("fullAddress"),
        is_virtual: form.flag("virtualEvent"),
        virtual_link: form.string("virtualLink"),
        max_capacity: form
            .parse::<i32>("maxCapacity")
            .ok()
            .flatten()
            .filter(|c| *c > 0)
            .unwrap_or(DEFAULT_CAPACITY),
        registration_deadline: form.date("registrationDeadline")?,
        require_registration: form.flag("requireRegistration"),
        open_to_public: form.flag("openToPublic"),
        volunteers_needed: form
            .parse::<i32>("volunteersNeeded")
            .ok()
            .flatten()
            .unwrap_or(0),
        contact_person: form.string("contactPerson"),
        contact_email: form.string("contactEmail"),
        contact_phone: form.string("contactPhone"),
        special_notes: form.string("specialNotes"),
        status: status.to_string(),
        tags: form.json::<Vec<String>>("eventTags")?.unwrap_or_default(),
        volunteer_roles: form
            .json::<Vec<VolunteerRoleData>>("volunteerRoles")?
            .unwrap_or_default(),
    })
}

/// Form fields of the media columns, in `EventMedia::paths` order
const MEDIA_FIELDS: [&str; 6] = [
    "eventImage",
    "contactPersonImage",
    "adImage1",
    "adImage2",
    "adVideo1",
    "adVideo2",
];

/// Writes every uploaded media file of the form. On failure the files
/// already written are removed again.
async fn save_media(media: &MediaStore, form: &MultipartForm) -> Result<EventMedia> {
    let mut paths: [Option<String>; 6] = Default::default();

    for (index, field) in MEDIA_FIELDS.iter().enumerate() {
        let Some(file) = form.file(field) else {
            continue;
        };

        match media.save(UPLOAD_ENTITY, file).await {
            Ok(path) => paths[index] = path,
            Err(e) => {
                let written: Vec<Option<&str>> = paths.iter().map(Option::as_deref).collect();
                media.delete_all(&written).await;
                return Err(e.into());
            }
        }
    }

    let [image_path, contact_person_image, ad_image_1, ad_image_2, ad_video_1, ad_video_2] = paths;

    Ok(EventMedia {
        image_path,
        contact_person_image,
        ad_image_1,
        ad_image_2,
        ad_video_1,
        ad_video_2,
    })
}

/// Old paths that a new upload replaced
fn replaced_paths<'a>(old: &'a EventMedia, new: &EventMedia) -> Vec<Option<&'a str>> {
    old.paths()
        .into_iter()
        .zip(new.paths())
        .filter(|(_, new)| new.is_some())
        .map(|(old, _)| old)
        .collect()
}

async fn load_detail(state: &AppState, event: Event) -> Result<EventDetail> {
    let tags = Event::tags(&state.pool, event.id)
        .await?
        .into_iter()
        .map(|t| t.tag)
        .collect();
    let volunteer_roles = Event::volunteer_roles(&state.pool, event.id).await?;
    let description_slots = distribute_description(Some(&event.description));

    Ok(EventDetail {
        event,
        tags,
        volunteer_roles,
        description_slots,
    })
}

// Handlers

/// Event page (HTML)
async fn show_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ShowEventTemplate> {
    let event = Event::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Event not found"))?;

    let tags = Event::tags(&state.pool, id)
        .await?
        .into_iter()
        .map(|t| t.tag)
        .collect();

    Ok(ShowEventTemplate::new(event, tags))
}

async fn list_events(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Result<Json<ActionResponse<Vec<Event>>>> {
    let events = Event::list(&state.pool, &filter).await?;

    Ok(ActionResponse::data(events))
}

async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse<EventDetail>>> {
    let event = Event::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Event not found"))?;

    Ok(ActionResponse::data(load_detail(&state, event).await?))
}

async fn event_metrics(State(state): State<AppState>) -> Result<Json<ActionResponse<EventMetrics>>> {
    Ok(ActionResponse::data(Event::metrics(&state.pool).await?))
}

async fn create_event(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ActionResponse<Event>>)> {
    let form = MultipartForm::from_multipart(multipart).await?;
    let data = event_data_from_form(&form)?;

    let media = save_media(&state.media, &form).await?;
    let event = match Event::create(&state.pool, data, media.clone()).await {
        Ok(event) => event,
        Err(e) => {
            state.media.delete_all(&media.paths()).await;
            return Err(e.into());
        }
    };

    tracing::info!(event_id = %event.id, name = %event.name, "Event created");

    Ok((
        StatusCode::CREATED,
        ActionResponse::with_message("Event created successfully", event),
    ))
}

async fn update_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<ActionResponse<Event>>> {
    let form = MultipartForm::from_multipart(multipart).await?;
    let data = event_data_from_form(&form)?;

    let existing = Event::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Event not found"))?;

    let media = save_media(&state.media, &form).await?;
    let event = match Event::update(&state.pool, id, data, media.clone()).await {
        Ok(event) => event,
        Err(e) => {
            state.media.delete_all(&media.paths()).await;
            return Err(e.into());
        }
    };

    let old_media = existing.media();
    state
        .media
        .delete_all(&replaced_paths(&old_media, &media))
        .await;

    tracing::info!(event_id = %id, "Event updated");

    Ok(ActionResponse::with_message("Event updated successfully", event))
}

async fn delete_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse<()>>> {
    let event = Event::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Event not found"))?;

    state.media.delete_all(&event.media().paths()).await;
    Event::delete(&state.pool, id).await?;

    tracing::info!(event_id = %id, "Event deleted");

    Ok(ActionResponse::message("Event deleted successfully"))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events/:id", get(show_event))
        .route("/api/events", get(list_events))
        .route("/api/events/:id", get(get_event))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/events", post(create_event))
        .route("/events/metrics", get(event_metrics))
        .route("/events/:id", put(update_event).delete(delete_event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(description: &str) -> Event {
        Event {
            id: Uuid::new_v4(),
            name: "Harvest Thanksgiving".to_string(),
            event_type: "Celebration".to_string(),
            type_other: None,
            category: "Worship".to_string(),
            category_other: None,
            description: description.to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(),
            end_time: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            is_recurring: false,
            location: "Main Sanctuary".to_string(),
            room_building: Some("Block A".to_string()),
            full_address: None,
            is_virtual: false,
            virtual_link: None,
            max_capacity: 50,
            registration_deadline: None,
            require_registration: false,
            open_to_public: true,
            volunteers_needed: 0,
            contact_person: Some("Deacon Owusu".to_string()),
            contact_email: None,
            contact_phone: None,
            special_notes: None,
            status: STATUS_PUBLISHED.to_string(),
            image_path: Some("/uploads/events/1-a.png".to_string()),
            contact_person_image: None,
            ad_image_1: None,
            ad_image_2: Some("/uploads/events/1-b.png".to_string()),
            ad_video_1: None,
            ad_video_2: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_labels() {
        let e = event("");
        assert_eq!(date_label(e.start_date, e.end_date), "Sunday, March 9, 2025");
        assert_eq!(time_label(e.start_time, e.end_time), "9:30 AM - 1:00 PM");
        assert_eq!(location_label(&e), "Main Sanctuary, Block A");
    }

    #[test]
    fn test_page_skips_empty_slots() {
        let page = ShowEventTemplate::new(event("Come and give thanks. Bring a friend."), vec![]);

        assert_eq!(page.top.as_deref(), Some("Come and give thanks."));
        assert_eq!(page.side.as_deref(), Some("Bring a friend."));
        assert!(page.bottom.is_empty());

        let html = page.render().unwrap();
        assert!(html.contains("Come and give thanks."));
        assert!(html.contains("Harvest Thanksgiving"));
    }

    #[test]
    fn test_page_fills_bottom_slots() {
        let page = ShowEventTemplate::new(event("One. Two. Three. Four. Five. Six."), vec![]);

        assert_eq!(page.top.as_deref(), Some("One. Two."));
        assert_eq!(page.bottom, vec!["Four.", "Five.", "Six."]);
    }

    #[test]
    fn test_replaced_paths_only_for_new_uploads() {
        let old = event("").media();
        let new = EventMedia {
            image_path: Some("/uploads/events/2-new.png".to_string()),
            ad_video_1: Some("/uploads/events/2-new.mp4".to_string()),
            ..Default::default()
        };

        assert_eq!(
            replaced_paths(&old, &new),
            vec![Some("/uploads/events/1-a.png"), None]
        );
    }

    #[test]
    fn test_form_defaults() {
        let mut form = MultipartForm::default();
        form.insert_text("eventName", "Youth Night");
        form.insert_text("eventType", "social");
        form.insert_text("eventLocation", "Other");
        form.insert_text("eventLocationCustom", "Beach Park");
        form.insert_text("startDate", "2025-05-01");
        form.insert_text("startTime", "18:00");
        form.insert_text("endDate", "2025-05-01");
        form.insert_text("endTime", "21:00");
        form.insert_text("eventTags", r#"["youth"]"#);

        let data = event_data_from_form(&form).unwrap();

        assert_eq!(data.event_type, "Social");
        assert_eq!(data.category, "Other");
        assert_eq!(data.location, "Beach Park");
        assert_eq!(data.max_capacity, DEFAULT_CAPACITY);
        assert_eq!(data.volunteers_needed, 0);
        assert_eq!(data.status, STATUS_PUBLISHED);
        assert_eq!(data.tags, vec!["youth"]);
    }

    #[test]
    fn test_form_rejects_end_before_start() {
        let mut form = MultipartForm::default();
        form.insert_text("eventName", "Vigil");
        form.insert_text("startDate", "2025-05-02");
        form.insert_text("startTime", "22:00");
        form.insert_text("endDate", "2025-05-01");
        form.insert_text("endTime", "06:00");

        assert!(matches!(
            event_data_from_form(&form),
            Err(AppError::Validation(_))
        ));
    }
}
