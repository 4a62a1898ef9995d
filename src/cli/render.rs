//! Plain text rendering of model output for the terminal.
use std::fmt::Write;

use crate::ai::recipe::models::RecipeResponse;
use crate::ai::structured::{StructuredOutput, StructuredResponse};

fn render_recipe(recipe: &RecipeResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", recipe.name);

    let times: Vec<String> = [
        ("Prep", &recipe.prep_time),
        ("Cook", &recipe.cook_time),
        ("Yield", &recipe.recipe_yield),
    ]
    .iter()
    .filter(|(_, v)| !v.is_empty())
    .map(|(k, v)| format!("{}: {}", k, v))
    .collect();
    if !times.is_empty() {
        let _ = writeln!(out, "{}", times.join(" | "));
    }

    let _ = writeln!(out, "\nIngredients");
    let mut section = "";
    for i in &recipe.ingredients {
        if i.section != section {
            section = &i.section;
            let _ = writeln!(out, "  {}", section);
        }
        let _ = writeln!(out, "  [{}] {} {}", i.id, i.quantity, i.name);
        if !i.annotations.is_empty() {
            let _ = writeln!(out, "      > {}", i.annotations);
        }
    }

    let _ = writeln!(out, "\nInstructions");
    for i in &recipe.instructions {
        let _ = writeln!(out, "  [{}] {}", i.id, i.text);
        if !i.annotations.is_empty() {
            let _ = writeln!(out, "      > {}", i.annotations);
        }
    }

    if !recipe.additional_info.is_empty() {
        let _ = writeln!(out, "\n{}", recipe.additional_info);
    }
    out
}

pub fn render(output: &StructuredOutput) -> String {
    match output {
        StructuredOutput::Conversational(c) => c.response.clone(),
        StructuredOutput::Envelope(StructuredResponse::Conversational(c)) => c.response.clone(),
        StructuredOutput::Envelope(StructuredResponse::Recipe(recipe)) => render_recipe(recipe),
    }
}
