use minijinja::{context, Environment};
use regex::Regex;
use serde::Serialize;

use crate::commerce::Product;

const PRODUCT_CATALOG_TEMPLATE: &str = include_str!("prompts/product_catalog.j2");

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub name: String,
    pub price: String,
    pub description: String,
}

pub struct CatalogPromptContext<'a> {
    pub base_prompt: &'a str,
    pub entries: &'a [CatalogEntry],
    pub max_products: u32,
}

/// Removes markup tags, including a dangling unterminated one.
pub fn strip_html(html: &str) -> String {
    match Regex::new(r"<[^>]*>?") {
        Ok(re) => re.replace_all(html, "").trim().to_string(),
        Err(_) => html.trim().to_string(),
    }
}

pub fn catalog_entries(products: &[Product], max_products: u32) -> Vec<CatalogEntry> {
    products
        .iter()
        .take(max_products as usize)
        .map(|product| {
            let description = product
                .body_html
                .as_deref()
                .map(strip_html)
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| "No description available".to_string());
            CatalogEntry {
                id: product.id,
                name: product.title.clone(),
                price: product
                    .variants
                    .first()
                    .and_then(|variant| variant.price.clone())
                    .unwrap_or_else(|| "N/A".to_string()),
                description,
            }
        })
        .collect()
}

pub fn render_catalog_prompt(ctx: &CatalogPromptContext<'_>) -> String {
    let mut env = Environment::new();
    if env
        .add_template("product_catalog", PRODUCT_CATALOG_TEMPLATE)
        .is_err()
    {
        return fallback_catalog_prompt(ctx);
    }

    let Ok(template) = env.get_template("product_catalog") else {
        return fallback_catalog_prompt(ctx);
    };

    template
        .render(context! {
            base_prompt => ctx.base_prompt,
            products => ctx.entries,
            max_products => ctx.max_products,
        })
        .unwrap_or_else(|_| fallback_catalog_prompt(ctx))
}

fn fallback_catalog_prompt(ctx: &CatalogPromptContext<'_>) -> String {
    let mut prompt = ctx.base_prompt.to_string();
    prompt.push_str("\n\nYou have access to the following products from the store:\n");
    for entry in ctx.entries {
        prompt.push_str(&format!(
            "- Name: {}\n  Price: ${}\n  Description: {}\n  ID: {}\n",
            entry.name, entry.price, entry.description, entry.id
        ));
    }
    prompt.push_str(
        "\nWhen a user asks about products or seems interested in shopping, recommend relevant products from this list.\n\
         Include the product name, price, and a brief description in your recommendations.\n",
    );
    prompt.push_str(&format!(
        "You can recommend up to {} products at a time.\n",
        ctx.max_products
    ));
    prompt
}
