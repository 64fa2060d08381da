//! Natural-language instructions sent to the agents.
use crate::model::{join_platforms, Platform, PlatformSet, Scripts};

pub fn generation(topic: &str, platforms: &PlatformSet, voice: &str) -> String {
    format!(
        "Research trending topics and generate platform-specific content scripts for the niche: {}. \
         Target platforms: {}. Brand voice guidelines: {}",
        topic.trim(),
        join_platforms(platforms),
        voice
    )
}

/// Lists every selected platform with its current script. Only
/// `Platform::DIRECT_POST` is published by the agent; the rest are prepared
/// for manual posting.
pub fn scheduling(scripts: &Scripts, platforms: &PlatformSet) -> String {
    let direct = Platform::DIRECT_POST;
    let mut sentences = vec!["Post the following approved content to the selected platforms.".to_string()];

    if platforms.contains(&direct) {
        match direct.direct_post_tool() {
            Some(tool) => sentences.push(format!("For {direct}, use the {tool} tool.")),
            None => sentences.push(format!("Post directly to {direct}.")),
        }
        sentences.push(format!("{direct} script: {}.", scripts.content(direct)));
        sentences.push("For other platforms, format the content for manual posting.".to_string());
    } else {
        sentences.push(
            "None of the selected platforms is posted automatically; format all content for manual posting."
                .to_string(),
        );
    }

    sentences.push(format!("Platforms selected: {}.", join_platforms(platforms)));
    let per_platform = platforms
        .iter()
        .map(|p| format!("{p} script: {}", scripts.content(*p)))
        .collect::<Vec<_>>()
        .join(". ");
    sentences.push(per_platform);
    sentences.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Script;

    fn scripts() -> Scripts {
        [
            (
                Platform::Twitter,
                Script {
                    content: "short take".into(),
                    ..Default::default()
                },
            ),
            (
                Platform::LinkedIn,
                Script {
                    content: "long take".into(),
                    ..Default::default()
                },
            ),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn generation_embeds_topic_platforms_and_voice() {
        let platforms: PlatformSet = [Platform::LinkedIn, Platform::Twitter].into_iter().collect();
        let text = generation("  AI tools ", &platforms, "Witty");
        assert!(text.contains("for the niche: AI tools."));
        assert!(text.contains("Target platforms: Twitter, LinkedIn."));
        assert!(text.ends_with("Brand voice guidelines: Witty"));
    }

    #[test]
    fn scheduling_names_the_direct_platform() {
        let platforms: PlatformSet = [Platform::Twitter, Platform::LinkedIn].into_iter().collect();
        let text = scheduling(&scripts(), &platforms);
        assert!(text.contains("use the TWITTER_CREATION_OF_A_POST tool"));
        assert!(text.contains("Twitter script: short take."));
        assert!(text.contains("Platforms selected: Twitter, LinkedIn."));
        assert!(text.contains("LinkedIn script: long take"));
    }

    #[test]
    fn scheduling_without_direct_platform_is_all_manual() {
        let platforms: PlatformSet = [Platform::LinkedIn].into_iter().collect();
        let text = scheduling(&scripts(), &platforms);
        assert!(!text.contains("TWITTER_CREATION_OF_A_POST"));
        assert!(text.contains("format all content for manual posting"));
        assert!(!text.contains("short take"));
    }
}
