use shared::{ModelChoice, Prediction, ScanReport};
use std::fmt::Write;

pub fn diagnosis_prompt(model: ModelChoice, prediction: &Prediction) -> String {
    format!(
        "You are an agricultural expert. Generate a diagnosis and recommended action plan for this plant disease detection result.
Structure your response as clean HTML. Use headings (h3, h4), lists (ul, li), and paragraphs (p). Do not include '<html>' or '<body>' tags.

- Model Used: {model}
- Disease Detected: {label}
- Confidence Score: {confidence:.1}%

Based on this, provide:
- Disease Name: (if identifiable, otherwise state \"Unknown\")
- Recommended Treatment or Action: clear, actionable steps
- Severity Level: Low, Moderate or Severe
- Preventive Tips: how to avoid this in future crops
- Chemical/Pesticide Recommendations: specific products if applicable, otherwise \"None recommended at this time\"

Keep the response practical and farmer-friendly. If the confidence is low, say that the diagnosis is uncertain.",
        model = model,
        label = prediction.label,
        confidence = prediction.confidence_percent(),
    )
}

pub fn history_prompt(reports: &[ScanReport]) -> String {
    let mut prompt = String::from(
        "You are an expert agricultural analyst. Analyze this crop scan history and provide a concise, insightful report.
Each entry represents one scan:
",
    );

    for report in reports {
        let _ = writeln!(
            prompt,
            "- Scan Time: {}, Disease Detected: {}, Confidence: {:.1}%, Model Used: {}",
            report.created_at.to_rfc3339(),
            report.prediction.label,
            report.prediction.confidence_percent(),
            report.model_used
        );
    }

    prompt.push_str(
        "
Generate the summary as clean HTML using headings (h3, h4), lists (ul, li) and paragraphs (p). Do not include '<html>' or '<body>' tags.
Include:
- Overall Health Summary: one paragraph on the overall crop health.
- Key Trends & Observations: the most frequently detected diseases, changes over time, and differences between models if several were used.
- Recommendations: actionable steps to improve crop health or the monitoring strategy.",
    );
    prompt
}
