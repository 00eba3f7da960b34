use serde::Deserialize;

use crate::model::FileCriteria;

/// Body of `/check_file_criteria`. `result` is true when the file meets the
/// criteria for analysis.
#[derive(Debug, Deserialize)]
pub(super) struct CriteriaResponse {
    pub result: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl From<CriteriaResponse> for FileCriteria {
    fn from(response: CriteriaResponse) -> Self {
        Self {
            exclude: !response.result,
            reason: response.message,
        }
    }
}
