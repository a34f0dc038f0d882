use serde::Serialize;

use super::schema::ValidatedOutput;
use crate::error::TaskError;

/// Caller-facing representation of a validated payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum ParsedOutput {
    Images {
        urls: Vec<String>,
    },
    Video {
        url: String,
    },
    Audio {
        url: String,
    },
    Model3d {
        model_file: Option<String>,
        preview_video: Option<String>,
        cutout_image: Option<String>,
    },
    Music {
        clips: Vec<ClipResource>,
    },
    Resources {
        urls: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipResource {
    pub id: String,
    pub audio_url: String,
    pub video_url: Option<String>,
    pub image_url: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub tags: Option<String>,
}

/// Flattens a validated payload into the fields callers consume. Fails with
/// `NoResourceFound` rather than returning an empty success when a
/// well-typed payload turned out to carry nothing.
pub fn extract(job_id: &str, validated: ValidatedOutput) -> Result<ParsedOutput, TaskError> {
    match validated {
        ValidatedOutput::Image(image) => {
            let mut urls = Vec::new();
            if let Some(url) = image.image_url {
                urls.push(url);
            }
            for url in image.image_urls.unwrap_or_default() {
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
            if urls.is_empty() {
                return Err(TaskError::NoResourceFound {
                    job_id: job_id.to_string(),
                });
            }
            Ok(ParsedOutput::Images { urls })
        }
        ValidatedOutput::Video(video) => Ok(ParsedOutput::Video {
            url: video.video_url,
        }),
        ValidatedOutput::Audio(audio) => Ok(ParsedOutput::Audio {
            url: audio.audio_url,
        }),
        ValidatedOutput::Model3d(asset) => Ok(ParsedOutput::Model3d {
            model_file: asset.model_file,
            preview_video: asset.preview_video,
            cutout_image: asset.cutout_image,
        }),
        ValidatedOutput::Music(music) => {
            let clips: Vec<ClipResource> = music
                .clips
                .into_iter()
                .map(|(id, clip)| ClipResource {
                    id,
                    audio_url: clip.audio_url,
                    video_url: clip.video_url,
                    image_url: clip.image_url,
                    title: clip.title,
                    duration: clip.duration,
                    tags: clip.tags,
                })
                .collect();
            if clips.is_empty() {
                return Err(TaskError::NoResourceFound {
                    job_id: job_id.to_string(),
                });
            }
            Ok(ParsedOutput::Music { clips })
        }
        ValidatedOutput::Generic(generic) => {
            if generic.urls.is_empty() {
                return Err(TaskError::NoResourceFound {
                    job_id: job_id.to_string(),
                });
            }
            Ok(ParsedOutput::Resources { urls: generic.urls })
        }
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use crate::error::TaskError;

    use super::super::schema::{ImageOutput, MusicClip, MusicOutput, ValidatedOutput, VideoOutput};
    use super::{extract, ParsedOutput};

    #[test]
    fn image_urls_merge_and_deduplicate() {
        let validated = ValidatedOutput::Image(ImageOutput {
            image_url: Some("https://x/1.png".to_string()),
            image_urls: Some(vec![
                "https://x/1.png".to_string(),
                "https://x/2.png".to_string(),
            ]),
        });
        assert_eq!(
            extract("task-1", validated).unwrap(),
            ParsedOutput::Images {
                urls: vec!["https://x/1.png".to_string(), "https://x/2.png".to_string()],
            }
        );
    }

    #[test]
    fn empty_image_list_is_no_resource_not_empty_success() {
        let validated = ValidatedOutput::Image(ImageOutput {
            image_url: None,
            image_urls: Some(Vec::new()),
        });
        assert!(matches!(
            extract("task-1", validated),
            Err(TaskError::NoResourceFound { job_id }) if job_id == "task-1"
        ));
    }

    #[test]
    fn single_resource_categories_pass_through() {
        let validated = ValidatedOutput::Video(VideoOutput {
            video_url: "https://x/clip.mp4".to_string(),
        });
        assert_eq!(
            extract("task-2", validated).unwrap(),
            ParsedOutput::Video {
                url: "https://x/clip.mp4".to_string(),
            }
        );
    }

    #[test]
    fn music_clips_become_a_flat_list() {
        let mut clips = IndexMap::new();
        clips.insert(
            "clip-1".to_string(),
            MusicClip {
                audio_url: "https://x/a.mp3".to_string(),
                video_url: None,
                image_url: None,
                title: Some("first".to_string()),
                duration: Some(30.0),
                tags: None,
            },
        );
        match extract("task-3", ValidatedOutput::Music(MusicOutput { clips })).unwrap() {
            ParsedOutput::Music { clips } => {
                assert_eq!(clips.len(), 1);
                assert_eq!(clips[0].id, "clip-1");
                assert_eq!(clips[0].audio_url, "https://x/a.mp3");
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn empty_clip_set_is_no_resource() {
        let validated = ValidatedOutput::Music(MusicOutput {
            clips: IndexMap::new(),
        });
        assert!(matches!(
            extract("task-3", validated),
            Err(TaskError::NoResourceFound { .. })
        ));
    }
}
