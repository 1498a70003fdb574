//! Board definition accepted when a match is created.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dto::validation::validate_not_blank,
    state::game::{Board, Category, Question},
};

/// Board file: categories of clues, each clue worth a distinct value.
#[derive(Debug, Deserialize, Validate)]
pub struct BoardInput {
    #[validate(custom(function = "validate_unique_categories"), nested)]
    pub categories: Vec<CategoryInput>,
}

fn validate_unique_categories(categories: &[CategoryInput]) -> Result<(), ValidationError> {
    if categories.is_empty() {
        return Err(ValidationError::new("empty_board"));
    }
    let mut seen = HashSet::new();
    for category in categories {
        if !seen.insert(category.name.trim().to_lowercase()) {
            let mut err = ValidationError::new("duplicate_category");
            err.message = Some(format!("category '{}' appears twice", category.name.trim()).into());
            return Err(err);
        }
    }
    Ok(())
}

/// One category of the board file.
#[derive(Debug, Deserialize, Serialize)]
pub struct CategoryInput {
    pub name: String,
    pub questions: Vec<QuestionInput>,
}

impl Validate for CategoryInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_not_blank(&self.name) {
            errors.add("name", e);
        }

        if self.questions.is_empty() {
            errors.add("questions", ValidationError::new("empty_category"));
        }

        // Lookups are by (category, value), so values must be unique per category.
        let mut seen = HashSet::new();
        if self.questions.iter().any(|q| !seen.insert(q.value)) {
            let mut err = ValidationError::new("duplicate_value");
            err.message = Some(format!("category '{}' repeats a value", self.name).into());
            errors.add("questions", err);
        }

        for question in &self.questions {
            if let Err(question_errors) = question.validate() {
                errors.merge_self("questions", Err(question_errors));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// One clue of the board file.
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct QuestionInput {
    #[validate(custom(function = "validate_not_blank"))]
    pub clue: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub answer: String,
    #[validate(range(min = 1))]
    pub value: i32,
    #[serde(default, alias = "daily_double")]
    pub is_wager: bool,
}

impl BoardInput {
    /// Parse and validate a board from JSON.
    pub fn from_json_str(raw: &str) -> Result<Self, crate::error::ServiceError> {
        let input: Self = serde_json::from_str(raw)
            .map_err(|err| crate::error::ServiceError::InvalidInput(format!("malformed board: {err}")))?;
        input.validate()?;
        Ok(input)
    }
}

impl From<BoardInput> for Board {
    fn from(input: BoardInput) -> Self {
        Self {
            categories: input
                .categories
                .into_iter()
                .map(|category| Category {
                    name: category.name.trim().to_string(),
                    questions: category
                        .questions
                        .into_iter()
                        .map(|q| Question {
                            clue: q.clue,
                            answer: q.answer,
                            value: q.value,
                            used: false,
                            is_wager: q.is_wager,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}
