use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::OutputKind;
use crate::error::TaskError;

/// A completed job's payload after its category check passed. Exactly one
/// variant per output category, so every category has a matching parser.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedOutput {
    Image(ImageOutput),
    Video(VideoOutput),
    Audio(AudioOutput),
    Model3d(Model3dOutput),
    Music(MusicOutput),
    Generic(GenericOutput),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageOutput {
    pub image_url: Option<String>,
    pub image_urls: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoOutput {
    pub video_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioOutput {
    pub audio_url: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model3dOutput {
    pub model_file: Option<String>,
    pub preview_video: Option<String>,
    pub cutout_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MusicClip {
    pub audio_url: String,
    pub video_url: Option<String>,
    pub image_url: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub tags: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MusicOutput {
    /// Clips keyed by the provider's clip id, in provider order.
    pub clips: IndexMap<String, MusicClip>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenericOutput {
    pub urls: Vec<String>,
}

/// Checks `raw` against the category's declared shape. Pure; the first
/// violation found is reported with the job id. A well-typed payload whose
/// resource lists are merely empty passes here and is rejected by the
/// parser instead.
pub fn parse_output(
    job_id: &str,
    category: OutputKind,
    raw: &Value,
) -> Result<ValidatedOutput, TaskError> {
    if let OutputKind::Generic = category {
        return parse_generic(job_id, raw);
    }

    let Some(fields) = raw.as_object() else {
        return Err(TaskError::validation(
            job_id,
            format!("output must be an object, got {}", json_type_name(raw)),
        ));
    };

    match category {
        OutputKind::Image => parse_image(job_id, fields),
        OutputKind::Video => parse_video(job_id, fields),
        OutputKind::Audio => parse_audio(job_id, fields),
        OutputKind::Model3d => parse_model3d(job_id, fields),
        OutputKind::Music => parse_music(job_id, fields),
        OutputKind::Generic => parse_generic(job_id, raw),
    }
}

fn parse_image(job_id: &str, fields: &Map<String, Value>) -> Result<ValidatedOutput, TaskError> {
    let image_url = opt_string(job_id, fields, "image_url")?;
    let image_urls = opt_string_list(job_id, fields, "image_urls")?;
    if image_url.is_none() && image_urls.is_none() {
        return Err(TaskError::validation(
            job_id,
            "output must contain image_url or image_urls",
        ));
    }
    Ok(ValidatedOutput::Image(ImageOutput {
        image_url,
        image_urls,
    }))
}

fn parse_video(job_id: &str, fields: &Map<String, Value>) -> Result<ValidatedOutput, TaskError> {
    let video_url = req_string(job_id, fields, "video_url")?;
    Ok(ValidatedOutput::Video(VideoOutput { video_url }))
}

fn parse_audio(job_id: &str, fields: &Map<String, Value>) -> Result<ValidatedOutput, TaskError> {
    let audio_url = req_string(job_id, fields, "audio_url")?;
    Ok(ValidatedOutput::Audio(AudioOutput { audio_url }))
}

fn parse_model3d(job_id: &str, fields: &Map<String, Value>) -> Result<ValidatedOutput, TaskError> {
    let model_file = opt_string(job_id, fields, "model_file")?;
    let preview_video = opt_string(job_id, fields, "preview_video")?;
    let cutout_image = opt_string(job_id, fields, "cutout_image")?;
    if model_file.is_none() && preview_video.is_none() && cutout_image.is_none() {
        return Err(TaskError::validation(
            job_id,
            "output must contain at least one of model_file, preview_video, cutout_image",
        ));
    }
    Ok(ValidatedOutput::Model3d(Model3dOutput {
        model_file,
        preview_video,
        cutout_image,
    }))
}

fn parse_music(job_id: &str, fields: &Map<String, Value>) -> Result<ValidatedOutput, TaskError> {
    let raw_clips = match fields.get("clips") {
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(TaskError::validation(
                job_id,
                format!(
                    "field 'clips' must be an object, got {}",
                    json_type_name(other)
                ),
            ));
        }
        None => {
            return Err(TaskError::validation(job_id, "output must contain clips"));
        }
    };

    let mut clips = IndexMap::new();
    for (clip_id, value) in raw_clips {
        let Some(clip_fields) = value.as_object() else {
            return Err(TaskError::validation(
                job_id,
                format!(
                    "clip '{clip_id}' must be an object, got {}",
                    json_type_name(value)
                ),
            ));
        };
        let audio_url = req_string(job_id, clip_fields, "audio_url").map_err(|err| {
            match err {
                TaskError::Validation { violation, .. } => TaskError::validation(
                    job_id,
                    format!("clip '{clip_id}': {violation}"),
                ),
                other => other,
            }
        })?;
        clips.insert(
            clip_id.clone(),
            MusicClip {
                audio_url,
                video_url: opt_string(job_id, clip_fields, "video_url")?,
                image_url: opt_string(job_id, clip_fields, "image_url")?,
                title: opt_string(job_id, clip_fields, "title")?,
                duration: opt_number(job_id, clip_fields, "duration")?,
                tags: opt_string(job_id, clip_fields, "tags")?,
            },
        );
    }
    Ok(ValidatedOutput::Music(MusicOutput { clips }))
}

fn parse_generic(job_id: &str, raw: &Value) -> Result<ValidatedOutput, TaskError> {
    let mut urls = Vec::new();
    harvest_urls(raw, &mut urls);
    if urls.is_empty() {
        return Err(TaskError::validation(
            job_id,
            "output carries no url-bearing fields",
        ));
    }
    Ok(ValidatedOutput::Generic(GenericOutput { urls }))
}

/// Collects every http(s) URL anywhere in the payload, deduplicated in
/// encounter order.
fn harvest_urls(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(url) => {
            let trimmed = url.trim();
            if !trimmed.is_empty()
                && trimmed.starts_with("http")
                && !out.iter().any(|existing| existing == trimmed)
            {
                out.push(trimmed.to_string());
            }
        }
        Value::Array(rows) => {
            for row in rows {
                harvest_urls(row, out);
            }
        }
        Value::Object(obj) => {
            for nested in obj.values() {
                harvest_urls(nested, out);
            }
        }
        _ => {}
    }
}

fn req_string(
    job_id: &str,
    fields: &Map<String, Value>,
    field: &str,
) -> Result<String, TaskError> {
    opt_string(job_id, fields, field)?.ok_or_else(|| {
        TaskError::validation(job_id, format!("output must contain {field}"))
    })
}

fn opt_string(
    job_id: &str,
    fields: &Map<String, Value>,
    field: &str,
) -> Result<Option<String>, TaskError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Some(other) => Err(TaskError::validation(
            job_id,
            format!(
                "field '{field}' must be a string, got {}",
                json_type_name(other)
            ),
        )),
    }
}

fn opt_string_list(
    job_id: &str,
    fields: &Map<String, Value>,
    field: &str,
) -> Result<Option<Vec<String>>, TaskError> {
    let rows = match fields.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(rows)) => rows,
        Some(other) => {
            return Err(TaskError::validation(
                job_id,
                format!(
                    "field '{field}' must be a list of strings, got {}",
                    json_type_name(other)
                ),
            ));
        }
    };

    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(value) = row.as_str() else {
            return Err(TaskError::validation(
                job_id,
                format!(
                    "field '{field}' must contain only strings, got {}",
                    json_type_name(row)
                ),
            ));
        };
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            values.push(trimmed.to_string());
        }
    }
    Ok(Some(values))
}

fn opt_number(
    job_id: &str,
    fields: &Map<String, Value>,
    field: &str,
) -> Result<Option<f64>, TaskError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(value)) => Ok(value.as_f64()),
        Some(other) => Err(TaskError::validation(
            job_id,
            format!(
                "field '{field}' must be a number, got {}",
                json_type_name(other)
            ),
        )),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::error::TaskError;

    use super::super::OutputKind;
    use super::{parse_output, ValidatedOutput};

    fn violation_of(err: TaskError) -> String {
        match err {
            TaskError::Validation { violation, .. } => violation,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn image_accepts_single_url_shape() {
        let raw = json!({"image_url": "https://x/y.png"});
        let validated = parse_output("task-1", OutputKind::Image, &raw).unwrap();
        assert_eq!(
            validated,
            ValidatedOutput::Image(super::ImageOutput {
                image_url: Some("https://x/y.png".to_string()),
                image_urls: None,
            })
        );
    }

    #[test]
    fn image_accepts_url_list_shape() {
        let raw = json!({"image_urls": ["https://x/1.png", "https://x/2.png"]});
        match parse_output("task-1", OutputKind::Image, &raw).unwrap() {
            ValidatedOutput::Image(image) => {
                assert_eq!(image.image_urls.unwrap().len(), 2);
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn image_rejects_empty_object() {
        let err = parse_output("task-1", OutputKind::Image, &json!({})).unwrap_err();
        assert_eq!(
            violation_of(err),
            "output must contain image_url or image_urls"
        );
    }

    #[test]
    fn image_rejects_mistyped_url_field() {
        let err = parse_output("task-1", OutputKind::Image, &json!({"image_url": 7})).unwrap_err();
        assert_eq!(
            violation_of(err),
            "field 'image_url' must be a string, got number"
        );
    }

    #[test]
    fn image_with_empty_list_passes_validation() {
        // An empty-but-well-typed list is the parser's problem, not a shape
        // violation.
        let raw = json!({"image_urls": []});
        assert!(parse_output("task-1", OutputKind::Image, &raw).is_ok());
    }

    #[test]
    fn non_object_output_is_rejected() {
        let err = parse_output("task-1", OutputKind::Video, &json!("done")).unwrap_err();
        assert_eq!(violation_of(err), "output must be an object, got string");
    }

    #[test]
    fn video_requires_its_url() {
        let err = parse_output("task-2", OutputKind::Video, &json!({"status": "ok"})).unwrap_err();
        assert_eq!(violation_of(err), "output must contain video_url");

        let raw = json!({"video_url": "https://x/clip.mp4"});
        assert!(parse_output("task-2", OutputKind::Video, &raw).is_ok());
    }

    #[test]
    fn audio_treats_blank_url_as_absent() {
        let err = parse_output("task-3", OutputKind::Audio, &json!({"audio_url": "  "})).unwrap_err();
        assert_eq!(violation_of(err), "output must contain audio_url");
    }

    #[test]
    fn model3d_needs_any_one_asset_field() {
        let raw = json!({"preview_video": "https://x/preview.mp4"});
        match parse_output("task-4", OutputKind::Model3d, &raw).unwrap() {
            ValidatedOutput::Model3d(asset) => {
                assert!(asset.model_file.is_none());
                assert!(asset.preview_video.is_some());
            }
            other => panic!("unexpected output {other:?}"),
        }

        let err = parse_output("task-4", OutputKind::Model3d, &json!({})).unwrap_err();
        assert_eq!(
            violation_of(err),
            "output must contain at least one of model_file, preview_video, cutout_image"
        );
    }

    #[test]
    fn music_collects_keyed_clips_in_order() {
        let raw = json!({
            "clips": {
                "clip-b": {"audio_url": "https://x/b.mp3", "duration": 31.5, "tags": "lo-fi"},
                "clip-a": {"audio_url": "https://x/a.mp3", "video_url": "https://x/a.mp4"},
            }
        });
        match parse_output("task-5", OutputKind::Music, &raw).unwrap() {
            ValidatedOutput::Music(music) => {
                let ids: Vec<&str> = music.clips.keys().map(String::as_str).collect();
                assert_eq!(ids, vec!["clip-b", "clip-a"]);
                assert_eq!(music.clips["clip-b"].duration, Some(31.5));
                assert_eq!(music.clips["clip-a"].video_url.as_deref(), Some("https://x/a.mp4"));
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn music_names_the_offending_clip() {
        let raw = json!({"clips": {"clip-1": {"video_url": "https://x/a.mp4"}}});
        let err = parse_output("task-5", OutputKind::Music, &raw).unwrap_err();
        assert_eq!(
            violation_of(err),
            "clip 'clip-1': output must contain audio_url"
        );
    }

    #[test]
    fn music_without_clips_field_is_rejected() {
        let err = parse_output("task-5", OutputKind::Music, &json!({})).unwrap_err();
        assert_eq!(violation_of(err), "output must contain clips");
    }

    #[test]
    fn generic_harvests_urls_from_nested_fields() {
        let raw = json!({
            "artifact": {"uri": "https://x/out.bin"},
            "previews": ["https://x/a.png", "https://x/a.png", "not-a-url"],
        });
        match parse_output("task-6", OutputKind::Generic, &raw).unwrap() {
            ValidatedOutput::Generic(generic) => {
                assert_eq!(
                    generic.urls,
                    vec!["https://x/out.bin".to_string(), "https://x/a.png".to_string()]
                );
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn generic_without_urls_is_rejected() {
        let err = parse_output("task-6", OutputKind::Generic, &json!({"ok": true})).unwrap_err();
        assert_eq!(violation_of(err), "output carries no url-bearing fields");
    }
}
