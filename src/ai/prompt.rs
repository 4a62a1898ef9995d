//! Reusable prompts using Handlebars for templating. Handlebars adds
//! additional security controls since it can't do much out of the box
//! without registering your own helpers. This is ideal since page text
//! pulled from the web should be considered untrusted and Handlebars
//! forces you to add only what you need.

use std::fmt;

use handlebars::Handlebars;

#[derive(Debug)]
pub enum Prompt {
    RecipeAssistant,
    ExtractRecipe,
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

const RECIPE_ASSISTANT_PROMPT: &str = r"
You are an AI assistant that helps with reading webpages with recipes on them, extracting the recipe information on the page into a structured JSON format, and providing additional conversational assistance to the user who is using the recipe.

If you are asked to extract a recipe from webpage text, or to make modifications to a recipe you have previously extracted, you should structure your output using the 'RecipeResponse' format. If you are asked questions about the recipe, questions about additional content on the webpage, or questions about cooking in general, you should respond using the 'ConversationalResponse' format.

When you modify a recipe you have previously extracted, keep the 'id' of every ingredient and instruction exactly as it was and keep them in the same order. Put clarifications like substitutions, conversions or timing estimates in the 'annotations' field instead of changing the other fields.
";

const EXTRACT_RECIPE_PROMPT: &str = r"
Extract the recipe JSON from the following webpage text:

####
{{page_text}}
####
{{#if annotations}}

While extracting, also fill in the 'annotations' fields as follows:
{{annotations}}
{{/if}}
";

pub fn templates<'a>() -> Handlebars<'a> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    // Prompts are plain text so HTML escaping would only mangle them
    registry.register_escape_fn(handlebars::no_escape);
    registry
        .register_template_string(&Prompt::RecipeAssistant.to_string(), RECIPE_ASSISTANT_PROMPT)
        .expect("Failed to register template");
    registry
        .register_template_string(&Prompt::ExtractRecipe.to_string(), EXTRACT_RECIPE_PROMPT)
        .expect("Failed to register template");
    registry
}
