use serde::Serialize;
use tera::{Context, Error as TeraError, Tera};

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_load_prompt() {
        let template = "Write a {{ name }} with {{ lines }} lines.";
        let mut context = HashMap::new();
        context.insert("name".to_string(), "haiku".to_string());
        context.insert("lines".to_string(), 3.to_string());

        let result = load_prompt(template, &context).unwrap();
        assert_eq!(result, "Write a haiku with 3 lines.");
    }

    #[test]
    fn test_load_prompt_missing_variable() {
        let template = "Write a {{ name }} with {{ lines }} lines.";
        let mut context = HashMap::new();
        context.insert("name".to_string(), "haiku".to_string());
        // 'lines' is missing from context
        let result = load_prompt(template, &context);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_prompt_nested_context() {
        let template = "{{ form.name }}: {{ form.rhyme_scheme }}";
        let result = load_prompt(template, &json!({"form": {"name": "limerick", "rhyme_scheme": "AABBA"}}))
            .unwrap();
        assert_eq!(result, "limerick: AABBA");
    }
}
