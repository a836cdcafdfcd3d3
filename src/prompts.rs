//! Prompt text for every call the crate makes to the model.

/// Output rules appended to every request that must come back as a document
const DOCUMENT_RULES: &str = "
RULES:
- Return exactly one complete HTML document, starting with <!DOCTYPE html>
- Put all CSS in a <style> tag and all JavaScript in a <script> tag
- External resources only from public CDNs (fonts, icons, Tailwind)
- Use placeholder images from https://picsum.photos when images are needed
- No explanations or commentary before or after the document
";

pub const GENERATE_SYSTEM: &str = "You are TechCode, an expert front-end engineer and web designer. \
You build complete, responsive, production-quality single-file websites with modern layout, \
accessible markup, and tasteful animation.";

pub const EDIT_SYSTEM: &str = "You are TechCode, an expert front-end engineer. \
You revise existing single-file websites according to the user's instruction, \
preserving everything the instruction does not ask to change.";

pub const FIX_SYSTEM: &str = "You are TechCode, a meticulous front-end reviewer. \
You find and repair bugs in single-file websites: broken markup, invalid CSS, \
JavaScript errors, missing event handlers, layout overflow and accessibility problems.";

pub const RESEARCH_SYSTEM: &str = "You are a research assistant. Search the web and summarize \
facts, current design trends, real content and branding details that would help build the \
requested website. Be concise and factual.";

pub const SUGGEST_SYSTEM: &str = "You are a senior web designer reviewing a website. \
Suggest concrete, short improvements the user could ask for next.";

pub const ESTIMATE_SYSTEM: &str = "You estimate how long an AI model needs to generate a website. \
Answer with JSON only.";

pub const CHAT_SYSTEM: &str = "You are TechCode's assistant. Answer questions about the user's \
current website code clearly and briefly. Do not return a full document unless asked.";

pub fn generate_prompt(prompt: &str, research: Option<&str>) -> String {
    match research {
        Some(context) if !context.trim().is_empty() => format!(
            "Research notes (use them for real content and facts):\n{}\n\nBuild this website: {}\n{}",
            context.trim(),
            prompt,
            DOCUMENT_RULES
        ),
        _ => format!("Build this website: {}\n{}", prompt, DOCUMENT_RULES),
    }
}

pub fn research_prompt(prompt: &str) -> String {
    format!("Collect background information for building this website: {}", prompt)
}

pub fn edit_prompt(code: &str, instruction: &str) -> String {
    format!(
        "Current website code:\n```html\n{}\n```\n\nApply this change: {}\n{}",
        code, instruction, DOCUMENT_RULES
    )
}

pub fn fix_prompt(code: &str) -> String {
    format!(
        "Review this website and fix every bug you find. Keep the design and content unchanged.\n```html\n{}\n```\n{}",
        code, DOCUMENT_RULES
    )
}

pub fn suggest_prompt(code: &str) -> String {
    format!(
        "Website code:\n```html\n{}\n```\n\nList 3 to 5 improvements.\nOne per line. Max 12 words per line.\nNo numbering, no markdown.",
        code
    )
}

pub fn estimate_prompt(prompt: &str) -> String {
    format!(
        "Website request: {}\n\nRespond with format:\n{{\"seconds\": <integer>, \"complexity\": \"simple\"|\"moderate\"|\"complex\"}}",
        prompt
    )
}

pub fn chat_prompt(code: Option<&str>, transcript: &str, message: &str) -> String {
    let code_section = match code {
        Some(code) => format!("Current website code:\n```html\n{}\n```\n\n", code),
        None => "No website has been generated yet.\n\n".to_string(),
    };
    if transcript.is_empty() {
        format!("{}User: {}", code_section, message)
    } else {
        format!("{}Conversation so far:\n{}\n\nUser: {}", code_section, transcript, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn research_context_is_prepended() {
        let with = generate_prompt("a bakery site", Some("Bakeries in Lyon open at 7am"));
        assert!(with.starts_with("Research notes"));
        assert!(with.contains("Bakeries in Lyon"));
        assert!(with.contains("Build this website: a bakery site"));

        let without = generate_prompt("a bakery site", Some("   "));
        assert!(without.starts_with("Build this website"));
    }

    #[test]
    fn edit_prompt_carries_code_and_instruction() {
        let prompt = edit_prompt("<p>hi</p>", "make it blue");
        assert!(prompt.contains("<p>hi</p>"));
        assert!(prompt.contains("Apply this change: make it blue"));
    }
}
