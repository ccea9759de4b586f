use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::ExplanationError;

pub const NOT_AVAILABLE: &str = "Information not available";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionInfo {
    pub description: Option<String>,
    pub symptoms: Option<String>,
    pub treatment: Option<String>,
    pub prognosis: Option<String>,
}

impl ConditionInfo {
    fn new(description: &str, symptoms: &str, treatment: &str, prognosis: &str) -> Self {
        Self {
            description: Some(description.to_string()),
            symptoms: Some(symptoms.to_string()),
            treatment: Some(treatment.to_string()),
            prognosis: Some(prognosis.to_string()),
        }
    }
}

lazy_static! {
    static ref BUILTIN_CONDITIONS: HashMap<String, ConditionInfo> = {
        let mut table = HashMap::new();
        table.insert("glioma".to_string(), ConditionInfo::new(
            "Glioma is a type of tumor that occurs in the brain and spinal cord. It begins in the glial cells that surround and support nerve cells.",
            "Headaches, nausea, vomiting, seizures, memory problems, changes in behavior, difficulty with balance, vision problems, and speech difficulties.",
            "Treatment typically involves surgery to remove as much of the tumor as possible, followed by radiation therapy and chemotherapy.",
            "The prognosis varies depending on the grade and location of the glioma, but generally higher-grade gliomas have a more serious outlook.",
        ));
        table.insert("meningioma".to_string(), ConditionInfo::new(
            "Meningioma is a tumor that forms on membranes that cover the brain and spinal cord just inside the skull. Most meningiomas are noncancerous (benign).",
            "Headaches, seizures, blurred vision, weakness in the limbs, and changes in personality or memory.",
            "If the meningioma is small and not causing symptoms, it may be monitored. Otherwise, surgery is the primary treatment, sometimes followed by radiation therapy.",
            "Meningiomas are often benign and slow-growing. The prognosis is generally good with proper treatment.",
        ));
        table.insert("notumor".to_string(), ConditionInfo::new(
            "No tumor detected in the brain scan. This means the scan does not show evidence of abnormal tissue growth that would indicate a tumor.",
            "While no tumor was found, your symptoms may be caused by other conditions that require further investigation.",
            "Since no tumor was detected, treatment will depend on identifying the actual cause of any symptoms you may be experiencing.",
            "The absence of a tumor is generally good news, but further evaluation may be needed to determine the cause of any symptoms.",
        ));
        table.insert("pituitary".to_string(), ConditionInfo::new(
            "A pituitary tumor is an abnormal growth in the pituitary gland, which is located at the base of the brain. Most pituitary tumors are noncancerous (benign).",
            "Headaches, vision problems, fatigue, unexplained weight changes, increased thirst and urination, mood changes, and hormonal imbalances.",
            "Treatment options include medication to control hormone production, surgery to remove the tumor, and radiation therapy.",
            "Most pituitary tumors are benign and treatable. The prognosis is generally good with proper treatment.",
        ));
        table.insert("benign".to_string(), ConditionInfo::new(
            "A benign lung nodule is a small growth on the lung that is not cancerous. These are quite common and usually don't require treatment.",
            "Most benign lung nodules don't cause symptoms. They are often found during imaging tests for other conditions.",
            "Benign nodules typically don't require treatment, but may be monitored with regular imaging to ensure they don't change over time.",
            "The prognosis for benign lung nodules is excellent, as they are not cancerous and rarely cause health problems.",
        ));
        table.insert("malignant".to_string(), ConditionInfo::new(
            "A malignant lung finding indicates lung cancer, which is the uncontrolled growth of abnormal cells in one or both lungs.",
            "Persistent cough, coughing up blood, chest pain, hoarseness, weight loss, shortness of breath, and recurrent respiratory infections.",
            "Treatment options include surgery, chemotherapy, radiation therapy, targeted drug therapy, and immunotherapy, depending on the type and stage of cancer.",
            "The prognosis depends on the type and stage of lung cancer, but early detection and treatment generally lead to better outcomes.",
        ));
        table.insert("normal".to_string(), ConditionInfo::new(
            "Your lung scan appears normal, with no evidence of nodules, masses, or other concerning findings.",
            "While your scan is normal, any symptoms you're experiencing may be caused by other conditions that require further investigation.",
            "Since no abnormalities were detected, treatment will depend on identifying the actual cause of any symptoms you may be experiencing.",
            "A normal lung scan is good news, but further evaluation may be needed to determine the cause of any symptoms.",
        ));
        table
    };
}

/// Read-only condition reference keyed by classifier label.
#[derive(Debug, Clone)]
pub struct ConditionTable {
    entries: HashMap<String, ConditionInfo>,
}

impl Default for ConditionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ConditionTable {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN_CONDITIONS.clone(),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ExplanationError> {
        let entries: HashMap<String, ConditionInfo> = serde_yaml::from_str(yaml)
            .map_err(|e| ExplanationError::Conditions(e.to_string()))?;
        Ok(Self { entries })
    }

    pub fn from_file(path: &Path) -> Result<Self, ExplanationError> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| ExplanationError::Conditions(format!("{}: {}", path.display(), e)))?;
        let table = Self::from_yaml(&yaml)?;
        log::info!("Loaded {} conditions from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn get(&self, label: &str) -> Option<&ConditionInfo> {
        self.entries.get(label)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
