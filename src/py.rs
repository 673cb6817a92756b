//! Python bindings for the command parser using PyO3

use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::matcher::RuleSpec;
use crate::parser::CommandParser;
use crate::render::HELP_TEXT;
use crate::types::Intent;

/// Classify a message and return the intent name (Python function)
#[pyfunction]
#[pyo3(name = "classify")]
pub fn py_classify(message: &str) -> &'static str {
    CommandParser::new().classifier().classify(message).intent.as_str()
}

/// Python wrapper for the command parser
#[pyclass(name = "CommandParser")]
pub struct PyCommandParser {
    parser: CommandParser,
}

fn parse_intent(name: &str) -> PyResult<Intent> {
    Intent::ALL
        .iter()
        .copied()
        .find(|intent| intent.as_str() == name)
        .ok_or_else(|| {
            PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("Unknown intent: {}", name))
        })
}

#[pymethods]
impl PyCommandParser {
    #[new]
    #[pyo3(signature = (rules = None))]
    fn new(rules: Option<Vec<(String, String)>>) -> PyResult<Self> {
        let parser = match rules {
            None => CommandParser::new(),
            Some(rules) => {
                let specs = rules
                    .into_iter()
                    .map(|(pattern, intent)| Ok(RuleSpec::new(pattern, parse_intent(&intent)?)))
                    .collect::<PyResult<Vec<_>>>()?;
                CommandParser::with_rules(specs)
                    .map_err(|e| PyErr::new::<pyo3::exceptions::PyValueError, _>(e.to_string()))?
            }
        };
        Ok(Self { parser })
    }

    /// Parse a message into intent, parameters and normalized text
    fn parse<'py>(&self, message: &str, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let parsed = self.parser.parse(message);

        let dict = PyDict::new_bound(py);
        dict.set_item("intent", parsed.intent.as_str())?;
        let params_json = serde_json::to_string(&parsed.params).map_err(|e| {
            PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
                "Failed to serialize parameters: {}",
                e
            ))
        })?;
        dict.set_item("params", params_json)?;
        dict.set_item("normalized", parsed.normalized)?;
        dict.set_item("rule", parsed.rule)?;
        Ok(dict)
    }

    /// Static command reference
    fn help_text(&self) -> &'static str {
        HELP_TEXT
    }

    /// Number of rules in the table
    fn __len__(&self) -> usize {
        self.parser.classifier().rules().len()
    }
}
