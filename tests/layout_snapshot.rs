use pdf_proof_rust::proof::{Alignment, FitConfig, LayoutResult, MarkerRegion, Weight, fit};

fn monospace(text: &str, weight: Weight, size: f32) -> f32 {
    let factor = match weight {
        Weight::Bold => 0.55,
        Weight::Regular => 0.5,
    };
    text.chars().count() as f32 * size * factor
}

fn describe(layout: &LayoutResult) -> String {
    let mut out = format!(
        "size={:.2} line_height={:.2} fits={}\n",
        layout.font_size, layout.line_height, layout.fits
    );
    for line in &layout.instructions {
        let weight = match line.weight {
            Weight::Bold => "bold   ",
            Weight::Regular => "regular",
        };
        out.push_str(&format!(
            "{} x={:.2} y={:.2} w={:.2} {:?}\n",
            weight, line.x, line.y, line.width, line.text
        ));
    }
    out
}

#[test]
fn fitted_layout() {
    let region = MarkerRegion::new(100.0, 400.0, 400.0, 550.0, true);
    let lines = ["Happy Birthday", "Maria", "With love from all of us!!"];

    let left = fit(&region, &lines, &monospace, &FitConfig::default()).unwrap();
    let centered = fit(
        &region,
        &lines,
        &monospace,
        &FitConfig {
            alignment: Alignment::Center,
            ..FitConfig::default()
        },
    )
    .unwrap();

    let rendered = format!("[left]\n{}[center]\n{}", describe(&left), describe(&centered));
    insta::assert_snapshot!(rendered);
}
