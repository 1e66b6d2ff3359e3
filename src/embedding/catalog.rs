use serde::Serialize;

/// How a catalog model can be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// Runs in-process with the bundled ONNX runtime.
    LocalClip,
    /// Needs an external encoder service.
    RemoteEncoder,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub dimensions: usize,
    pub languages: &'static str,
    pub size: &'static str,
    #[serde(skip)]
    pub family: ModelFamily,
}

pub static CATALOG: [ModelInfo; 4] = [
    ModelInfo {
        id: "clip-ViT-B-32-multilingual-v1",
        name: "Multilingual CLIP ViT-B/32",
        dimensions: 512,
        languages: "50+ including Icelandic",
        size: "~600MB",
        family: ModelFamily::RemoteEncoder,
    },
    ModelInfo {
        id: "clip-ViT-B-32",
        name: "CLIP ViT-B/32 (OpenAI)",
        dimensions: 512,
        languages: "English only",
        size: "~350MB",
        family: ModelFamily::LocalClip,
    },
    ModelInfo {
        id: "clip-ViT-L-14",
        name: "CLIP ViT-L/14 (OpenAI)",
        dimensions: 768,
        languages: "English only",
        size: "~900MB",
        family: ModelFamily::RemoteEncoder,
    },
    ModelInfo {
        id: "xlm-roberta-large-ViT-H-14",
        name: "XLM-RoBERTa + ViT-H/14",
        dimensions: 1024,
        languages: "100+ languages",
        size: "~2.5GB",
        family: ModelFamily::RemoteEncoder,
    },
];

pub fn find_model(id: &str) -> Option<&'static ModelInfo> {
    CATALOG.iter().find(|model| model.id == id)
}
