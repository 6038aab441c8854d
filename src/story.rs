use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryIdea {
    pub id: i64,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotPrompt {
    pub segment: u32,
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
struct IdeasRoot {
    ideas: Vec<StoryIdea>,
}

#[derive(Debug, Deserialize)]
struct PromptsRoot {
    prompts: Vec<ShotPrompt>,
}

// Models occasionally wrap JSON-mode output in a Markdown fence.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = match rest.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
        _ => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

pub fn parse_story_ideas(text: &str) -> Result<Vec<StoryIdea>> {
    let root: IdeasRoot = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| PipelineError::malformed("story ideas", e.to_string()))?;

    if root.ideas.is_empty() {
        return Err(PipelineError::malformed("story ideas", "no ideas returned"));
    }
    if let Some(bad) = root.ideas.iter().find(|i| i.title.trim().is_empty()) {
        return Err(PipelineError::malformed(
            "story ideas",
            format!("idea {} has an empty title", bad.id),
        ));
    }

    Ok(root.ideas)
}

pub fn parse_shot_prompts(text: &str) -> Result<Vec<ShotPrompt>> {
    let root: PromptsRoot = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| PipelineError::malformed("video prompts", e.to_string()))?;

    if root.prompts.is_empty() {
        return Err(PipelineError::malformed("video prompts", "no segments returned"));
    }

    let mut seen = HashSet::new();
    for shot in &root.prompts {
        if shot.segment == 0 {
            return Err(PipelineError::malformed(
                "video prompts",
                "segment numbers start at 1",
            ));
        }
        if !seen.insert(shot.segment) {
            return Err(PipelineError::malformed(
                "video prompts",
                format!("segment {} appears twice", shot.segment),
            ));
        }
        if shot.prompt.trim().is_empty() {
            return Err(PipelineError::malformed(
                "video prompts",
                format!("segment {} has an empty prompt", shot.segment),
            ));
        }
    }

    let mut prompts = root.prompts;
    prompts.sort_by_key(|p| p.segment);
    Ok(prompts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ideas_in_order() {
        let text = r#"{"ideas":[
            {"id":1,"title":"Red Dust","description":"A detective on Mars."},
            {"id":2,"title":"Low Orbit","description":"A heist in orbit."}
        ]}"#;
        let ideas = parse_story_ideas(text).unwrap();
        assert_eq!(ideas.len(), 2);
        assert_eq!(ideas[1].title, "Low Orbit");
    }

    #[test]
    fn ideas_inside_code_fence_are_accepted() {
        let text = "```json\n{\"ideas\":[{\"id\":7,\"title\":\"T\",\"description\":\"D\"}]}\n```";
        assert_eq!(parse_story_ideas(text).unwrap()[0].id, 7);
    }

    #[test]
    fn fence_tag_is_case_insensitive() {
        let upper = "```JSON\n{\"prompts\":[{\"segment\":1,\"prompt\":\"dunes\"}]}\n```";
        let bare = "```\n{\"prompts\":[{\"segment\":1,\"prompt\":\"dunes\"}]}\n```";
        assert_eq!(parse_shot_prompts(upper).unwrap()[0].prompt, "dunes");
        assert_eq!(parse_shot_prompts(bare).unwrap()[0].prompt, "dunes");
    }

    #[test]
    fn rejects_mismatched_idea_schema() {
        for text in [
            "not json",
            r#"{"concepts":[]}"#,
            r#"{"ideas":[]}"#,
            r#"{"ideas":[{"id":1,"description":"no title"}]}"#,
            r#"{"ideas":[{"id":1,"title":"  ","description":"blank"}]}"#,
        ] {
            let err = parse_story_ideas(text).unwrap_err();
            assert!(
                matches!(err, PipelineError::MalformedResponse { .. }),
                "{text} -> {err:?}"
            );
        }
    }

    #[test]
    fn shot_prompts_are_sorted_by_segment() {
        let text = r#"{"prompts":[
            {"segment":2,"prompt":"wide shot of a dome"},
            {"segment":1,"prompt":"red dunes at dawn"}
        ]}"#;
        let shots = parse_shot_prompts(text).unwrap();
        assert_eq!(shots[0].segment, 1);
        assert_eq!(shots[1].segment, 2);
    }

    #[test]
    fn rejects_duplicate_or_zero_segments() {
        let dup = r#"{"prompts":[{"segment":1,"prompt":"a"},{"segment":1,"prompt":"b"}]}"#;
        let zero = r#"{"prompts":[{"segment":0,"prompt":"a"}]}"#;
        assert!(parse_shot_prompts(dup).is_err());
        assert!(parse_shot_prompts(zero).is_err());
    }
}
