//! Prompt templates for classification requests

use super::types::ClassificationRequest;

/// System instruction for single requests
pub const SYSTEM_INSTRUCTION: &str = "You are an assistant to a bookkeeper. \
Answer with only the name of the most likely category from the provided list, exactly as written. \
If the list does not contain a reasonable choice or you do not know the business, \
answer \"None\" followed by a short web search query that would identify the business.";

/// System instruction for batched requests
pub const BATCH_SYSTEM_INSTRUCTION: &str = "You are an assistant to a bookkeeper. \
For every numbered transaction pick the most likely category from the provided list, exactly as written. \
Reply with a JSON array of strings, one entry per transaction in the same order. \
Use \"None\" for transactions you cannot classify.";

fn describe(request: &ClassificationRequest) -> String {
    let mut line = format!(
        "a transaction from \"{}\" for \"{:.2}\" dollars",
        request.name.trim(),
        request.amount
    );
    match request.industry.as_deref() {
        Some(industry) => line.push_str(&format!(" by a business in the \"{}\" industry", industry)),
        None => line.push_str(" by a business"),
    }
    if let Some(location) = request.location.as_deref() {
        line.push_str(&format!(" located in \"{}\"", location));
    }
    line
}

/// Prompt for a single transaction
pub fn classification_prompt(request: &ClassificationRequest) -> String {
    let mut prompt = format!(
        "Using only the provided list of categories, what type of business expense would {} be?\nCategories: {}",
        describe(request),
        request.categories.join(", ")
    );

    if !request.context.is_empty() {
        prompt.push_str("\n\nAdditional information about the business:\n");
        for ctx in &request.context {
            prompt.push_str("- ");
            prompt.push_str(ctx.trim());
            prompt.push('\n');
        }
    }

    prompt
}

/// Prompt covering several transactions that share one category list
pub fn batch_prompt(requests: &[ClassificationRequest]) -> String {
    let choices = requests
        .first()
        .map(|r| r.categories.join(", "))
        .unwrap_or_default();

    let mut prompt = format!(
        "Using only the provided list of categories, classify each transaction.\nCategories: {}\n\nTransactions:\n",
        choices
    );
    for (i, request) in requests.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, describe(request)));
        for ctx in &request.context {
            prompt.push_str(&format!("   ({})\n", ctx.trim()));
        }
    }
    prompt
}
