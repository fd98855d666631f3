use crate::error::{ParameterViolation, ValidationError};
use crate::model::{ModelDefinition, ParamValues, ParameterSpec};

/// Checks every declared parameter for presence and domain.
/// Undeclared keys are reported as well.
pub fn validate(model: &ModelDefinition, param_values: &ParamValues) -> Result<(), ValidationError> {
    check(model.parameters.iter(), param_values)
}

/// Like [`validate`], but also covers the initial-condition fields of the form.
pub fn validate_form(model: &ModelDefinition, values: &ParamValues) -> Result<(), ValidationError> {
    check(
        model.parameters.iter().chain(model.initial_fields.iter()),
        values,
    )
}

fn check<'a>(
    specs: impl Iterator<Item = &'a ParameterSpec> + Clone,
    values: &ParamValues,
) -> Result<(), ValidationError> {
    let mut violations = Vec::new();

    for spec in specs.clone() {
        match values.get(spec.name) {
            None => violations.push(ParameterViolation {
                parameter: spec.name.to_string(),
                reason: "is required".to_string(),
            }),
            Some(&value) => {
                if let Some(reason) = spec.constraint.check(value) {
                    violations.push(ParameterViolation {
                        parameter: spec.name.to_string(),
                        reason,
                    });
                }
            }
        }
    }

    for name in values.keys() {
        if !specs.clone().any(|spec| spec.name == name.as_str()) {
            violations.push(ParameterViolation {
                parameter: name.clone(),
                reason: "is not a parameter of this model".to_string(),
            });
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::param_values;
    use crate::models::ModelFamily;

    #[test]
    fn validate_reports_every_negative_rate() {
        let model = ModelFamily::Sir.definition();
        let values = param_values([("beta", -1.0), ("gamma", -1.0), ("n", 1000.0)]);
        let err = validate(&model, &values).expect_err("negative rates must be rejected");
        let names: Vec<&str> = err.parameters().collect();
        assert_eq!(names, vec!["beta", "gamma"]);
    }

    #[test]
    fn validate_accepts_defaults() {
        for family in ModelFamily::ALL {
            let model = family.definition();
            let values = model.default_values();
            validate_form(&model, &values).expect("defaults should validate");
        }
    }

    #[test]
    fn validate_reports_missing_and_unknown_parameters() {
        let model = ModelFamily::Logistic.definition();
        let values = param_values([("r", 0.2), ("carrying", 150.0)]);
        let err = validate(&model, &values).expect_err("k is missing");
        assert_eq!(err.violations.len(), 2);
        assert_eq!(err.violations[0].parameter, "k");
        assert_eq!(err.violations[0].reason, "is required");
        assert_eq!(err.violations[1].parameter, "carrying");
    }

    #[test]
    fn validate_form_checks_initial_fields() {
        let model = ModelFamily::Seir.definition();
        let mut values = model.default_values();
        values.insert("e0".into(), -3.0);
        values.insert("sigma".into(), f64::NAN);
        let err = validate_form(&model, &values).expect_err("bad form");
        let names: Vec<&str> = err.parameters().collect();
        assert_eq!(names, vec!["sigma", "e0"]);
    }
}
