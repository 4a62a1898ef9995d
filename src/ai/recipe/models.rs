//! Recipe result types.
//!
//! Ingredients and instructions carry ids (`$I1`, `$S1`, ...) that the
//! model keeps stable across follow-up turns, so a client can match an
//! annotated item in a later response to the one it already shows.

use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::{Result, bail};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

static INGREDIENT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$I\d+$").expect("Invalid ingredient id regex"));
static INSTRUCTION_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$S\d+$").expect("Invalid instruction id regex"));

/// One ingredient in a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub quantity: String,
    pub name: String,
    pub id: String,
    pub section: String,
    pub annotations: String,
}

/// One instruction in a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: String,
    pub text: String,
    pub annotations: String,
}

/// Recipe extracted from a website.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeResponse {
    pub name: String,
    pub prep_time: String,
    pub cook_time: String,
    pub recipe_yield: String,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<Instruction>,
    pub additional_info: String,
}

// Partial versions of the above used for snapshots of a response that
// is still streaming. Field names have to match exactly.

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialIngredient {
    quantity: Option<String>,
    name: Option<String>,
    id: Option<String>,
    section: Option<String>,
    annotations: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialInstruction {
    id: Option<String>,
    text: Option<String>,
    annotations: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialRecipe {
    name: Option<String>,
    prep_time: Option<String>,
    cook_time: Option<String>,
    recipe_yield: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    ingredients: Vec<PartialIngredient>,
    #[serde(deserialize_with = "null_as_empty")]
    instructions: Vec<PartialInstruction>,
    additional_info: Option<String>,
}

// A key with no value yet is completed as `null`
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn check_ids<'a>(kind: &str, ids: impl Iterator<Item = &'a str>, pattern: &Regex) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !pattern.is_match(id) {
            bail!("Invalid {} id {}", kind, id);
        }
        if !seen.insert(id) {
            bail!("Duplicate {} id {}", kind, id);
        }
    }
    Ok(())
}

/// True when the ids in `ids` that also exist in `other` appear in the
/// same relative order in both.
fn keeps_order(ids: &[&str], other: &[&str]) -> bool {
    let shared: HashSet<&str> = ids.iter().copied().filter(|i| other.contains(i)).collect();
    let ours = ids.iter().filter(|i| shared.contains(*i));
    let theirs = other.iter().filter(|i| shared.contains(*i));
    ours.eq(theirs)
}

impl RecipeResponse {
    pub fn ingredient_ids(&self) -> Vec<&str> {
        self.ingredients.iter().map(|i| i.id.as_str()).collect()
    }

    pub fn instruction_ids(&self) -> Vec<&str> {
        self.instructions.iter().map(|i| i.id.as_str()).collect()
    }

    pub fn ingredient(&self, id: &str) -> Option<&Ingredient> {
        self.ingredients.iter().find(|i| i.id == id)
    }

    /// Checks that every id follows the `$I<n>`/`$S<n>` scheme and is
    /// unique within this recipe.
    pub fn validate_ids(&self) -> Result<()> {
        check_ids(
            "ingredient",
            self.ingredients.iter().map(|i| i.id.as_str()),
            &INGREDIENT_ID,
        )?;
        check_ids(
            "instruction",
            self.instructions.iter().map(|i| i.id.as_str()),
            &INSTRUCTION_ID,
        )?;
        Ok(())
    }

    /// Checks that this recipe is an edit of `previous` that kept its
    /// item ids: items that survived kept their id and their order, and
    /// the ids weren't all minted anew.
    pub fn is_revision_of(&self, previous: &RecipeResponse) -> bool {
        let pairs = [
            (self.ingredient_ids(), previous.ingredient_ids()),
            (self.instruction_ids(), previous.instruction_ids()),
        ];
        pairs.iter().all(|(ours, theirs)| {
            let any_shared = theirs.is_empty() || ours.iter().any(|i| theirs.contains(i));
            any_shared && keeps_order(ours, theirs)
        })
    }
}

/// JSON schema for [`RecipeResponse`] in the strict subset accepted by
/// structured outputs (every field required, no extra properties).
pub fn recipe_json_schema() -> Value {
    json!({
        "type": "object",
        "description": "Recipe extracted from a website.",
        "properties": {
            "name": {
                "type": "string",
                "description": "Name of the recipe."
            },
            "prep_time": {
                "type": "string",
                "description": "Preparation time for the recipe, in a human-readable format like '1 hour' or '30 minutes'. Leave blank if preparation time is not specified."
            },
            "cook_time": {
                "type": "string",
                "description": "Cooking time for the recipe, in a human-readable format like '1 hour' or '30 minutes'. Leave blank if cooking time is not specified."
            },
            "recipe_yield": {
                "type": "string",
                "description": "Yield of the recipe expressed as a number or a range, like '4 servings' or '2-3 dozen'. Leave blank if the yield of the recipe is not specified."
            },
            "ingredients": {
                "type": "array",
                "description": "List of ingredients with quantities.",
                "items": {
                    "type": "object",
                    "description": "One ingredient in a recipe.",
                    "properties": {
                        "quantity": {
                            "type": "string",
                            "description": "Quantity or number of units of the ingredient. Can be left blank if a quantity is not specified (e.g., 'salt to taste' or 'black pepper')."
                        },
                        "name": {
                            "type": "string",
                            "description": "Name of the ingredient, including any qualifiers like 'chopped' or 'diced' or 'large' or 'freshly ground'. Don't include quantities or units here as they should be in the 'quantity' field."
                        },
                        "id": {
                            "type": "string",
                            "description": "Unique identifier for the ingredient in form '$I1', '$I2', etc."
                        },
                        "section": {
                            "type": "string",
                            "description": "Optional section or category that the ingredient belongs to, like 'For the sauce' or 'For the dough'. Include this only if the recipe includes multiple sections in the list of ingredients."
                        },
                        "annotations": {
                            "type": "string",
                            "description": "Use this field to provide annotations on the ingredient, if they are requested by the user. For example, if the user asks for substitutions or unit conversions, you could provide those details here. Leave blank when initially extracting the recipe."
                        }
                    },
                    "required": ["quantity", "name", "id", "section", "annotations"],
                    "additionalProperties": false
                }
            },
            "instructions": {
                "type": "array",
                "description": "Step-by-step instructions to make the recipe.",
                "items": {
                    "type": "object",
                    "description": "One instruction in a recipe.",
                    "properties": {
                        "id": {
                            "type": "string",
                            "description": "Unique identifier for the instruction in form '$S1', '$S2', etc."
                        },
                        "text": {
                            "type": "string",
                            "description": "A single step in the recipe, extracted from the page text. Follow the structure of the text for cues on how to split the instructions into steps."
                        },
                        "annotations": {
                            "type": "string",
                            "description": "Use this field to provide annotations on the instruction, if they are requested by the user. For example, if the user asks for an estimate of how long each step takes, you could provide those details here. Leave blank when initially extracting the recipe."
                        }
                    },
                    "required": ["id", "text", "annotations"],
                    "additionalProperties": false
                }
            },
            "additional_info": {
                "type": "string",
                "description": "Any other useful information from the page about the recipe, like storage tips or notes from the author. Leave blank if there isn't any."
            }
        },
        "required": [
            "name",
            "prep_time",
            "cook_time",
            "recipe_yield",
            "ingredients",
            "instructions",
            "additional_info"
        ],
        "additionalProperties": false
    })
}
