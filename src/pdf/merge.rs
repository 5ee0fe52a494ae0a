use anyhow::{Context, Result, anyhow};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use tracing::debug;

use super::document::{inherited_attribute, load_document, page_geometry_in, page_id, resolve};

const OVERLAY_NAME: &str = "ProofOverlay";

/// Stamps the first page of `overlay` onto page `page_index` of `template`.
///
/// The overlay becomes a form XObject drawn after the page's own content, which
/// is wrapped in `q`/`Q` so its graphics state cannot leak into the overlay.
/// Every other page is carried over untouched.
pub fn merge_overlay(template: &[u8], overlay: &[u8], page_index: usize) -> Result<Vec<u8>> {
    let mut base = load_document(template).with_context(|| "failed to read template pdf")?;
    let mut layer = load_document(overlay).with_context(|| "failed to read overlay pdf")?;
    let target = page_id(&base, page_index)?;
    let geometry = page_geometry_in(&base, target)?;

    layer.renumber_objects_with(base.max_id + 1);
    let layer_page = page_id(&layer, 0).with_context(|| "overlay pdf has no page")?;
    let content = layer
        .get_page_content(layer_page)
        .with_context(|| "failed to read overlay content")?;
    let resources = effective_resources(&layer, layer_page)?;
    let groups = optional_content_groups(&layer);
    base.max_id = base.max_id.max(layer.max_id);
    base.objects.extend(layer.objects);

    let form = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(geometry.width.into()),
                Object::Real(geometry.height.into()),
            ]),
            "Matrix" => Object::Array(vec![
                Object::Integer(1),
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(1),
                Object::Real(geometry.origin_x.into()),
                Object::Real(geometry.origin_y.into()),
            ]),
            "Resources" => Object::Dictionary(resources),
        },
        content,
    );
    let form_id = base.add_object(form);

    let mut page_resources = effective_resources(&base, target)?;
    let mut xobjects = match page_resources.get(b"XObject") {
        Ok(value) => resolve(&base, value)?
            .as_dict()
            .map_err(|_| anyhow!("page XObject resources are not a dictionary"))?
            .clone(),
        Err(_) => Dictionary::new(),
    };
    let name = unused_name(&xobjects);
    xobjects.set(name.clone(), Object::Reference(form_id));
    page_resources.set("XObject", Object::Dictionary(xobjects));

    let mut contents = content_refs(&base, target)?;
    let open_id = base.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let close_id = base.add_object(Stream::new(
        Dictionary::new(),
        format!("\nQ\nq /{} Do Q\n", name).into_bytes(),
    ));
    contents.insert(0, Object::Reference(open_id));
    contents.push(Object::Reference(close_id));

    let page = base
        .get_dictionary_mut(target)
        .with_context(|| "template page is not a dictionary")?;
    page.set("Resources", Object::Dictionary(page_resources));
    page.set("Contents", Object::Array(contents));

    register_optional_content(&mut base, groups)?;
    base.prune_objects();
    debug!(page = page_index + 1, xobject = name.as_str(), "overlay merged");

    let mut buffer = Vec::new();
    base.save_to(&mut buffer)
        .with_context(|| "failed to write merged pdf")?;
    Ok(buffer)
}

fn effective_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    match inherited_attribute(doc, page_id, b"Resources") {
        Some(value) => Ok(value
            .as_dict()
            .map_err(|_| anyhow!("page resources are not a dictionary"))?
            .clone()),
        None => Ok(Dictionary::new()),
    }
}

fn content_refs(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>> {
    let page = doc.get_dictionary(page_id)?;
    let Ok(contents) = page.get(b"Contents") else {
        return Ok(Vec::new());
    };
    match contents {
        Object::Reference(id) => match doc.get_object(*id)? {
            Object::Array(items) => Ok(items.clone()),
            _ => Ok(vec![Object::Reference(*id)]),
        },
        Object::Array(items) => Ok(items.clone()),
        _ => Err(anyhow!("unsupported page Contents entry")),
    }
}

fn unused_name(xobjects: &Dictionary) -> String {
    let mut name = OVERLAY_NAME.to_string();
    let mut suffix = 1;
    while xobjects.has(name.as_bytes()) {
        name = format!("{}{}", OVERLAY_NAME, suffix);
        suffix += 1;
    }
    name
}

fn catalog_id(doc: &Document) -> Result<ObjectId> {
    doc.trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .with_context(|| "pdf has no document catalog")
}

fn optional_content_groups(doc: &Document) -> Vec<Object> {
    let groups = (|| -> Result<Vec<Object>> {
        let catalog = doc.get_dictionary(catalog_id(doc)?)?;
        let properties = resolve(doc, catalog.get(b"OCProperties")?)?.as_dict()?;
        Ok(resolve(doc, properties.get(b"OCGs")?)?.as_array()?.clone())
    })();
    groups.unwrap_or_default()
}

fn register_optional_content(doc: &mut Document, groups: Vec<Object>) -> Result<()> {
    if groups.is_empty() {
        return Ok(());
    }
    let catalog_id = catalog_id(doc)?;
    let catalog = doc.get_dictionary(catalog_id)?;
    let mut properties = match catalog.get(b"OCProperties") {
        Ok(value) => resolve(doc, value)?.as_dict()?.clone(),
        Err(_) => Dictionary::new(),
    };
    let mut ocgs = match properties.get(b"OCGs") {
        Ok(value) => resolve(doc, value)?.as_array()?.clone(),
        Err(_) => Vec::new(),
    };
    let mut defaults = match properties.get(b"D") {
        Ok(value) => resolve(doc, value)?.as_dict()?.clone(),
        Err(_) => Dictionary::new(),
    };
    let mut on = match defaults.get(b"ON") {
        Ok(value) => resolve(doc, value)?.as_array()?.clone(),
        Err(_) => Vec::new(),
    };
    ocgs.extend(groups.iter().cloned());
    on.extend(groups);
    defaults.set("ON", Object::Array(on));
    properties.set("OCGs", Object::Array(ocgs));
    properties.set("D", Object::Dictionary(defaults));
    doc.get_dictionary_mut(catalog_id)?
        .set("OCProperties", Object::Dictionary(properties));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::fixtures::{integer_array, sample_pdf};
    use crate::pdf::overlay::{OverlayStyle, render_overlay};
    use crate::proof::{FitConfig, MarkerRegion, PageGeometry, ResolvedFonts, fit};

    fn overlay_for(geometry: PageGeometry) -> Vec<u8> {
        let region = MarkerRegion::new(100.0, 300.0, 388.0, 444.0, true);
        let fonts = ResolvedFonts::builtin();
        let layout = fit(&region, &["Proof", "Line two"], &fonts, &FitConfig::default())
            .expect("fit");
        render_overlay(geometry, &region, &layout, &fonts, &OverlayStyle::default())
            .expect("overlay")
    }

    fn page_content(doc: &Document, index: usize) -> String {
        let id = page_id(doc, index).expect("page id");
        String::from_utf8_lossy(&doc.get_page_content(id).expect("content")).into_owned()
    }

    fn form_for(doc: &Document, index: usize, name: &str) -> Stream {
        let id = page_id(doc, index).expect("page id");
        let resources = effective_resources(doc, id).expect("resources");
        let xobjects = resolve(doc, resources.get(b"XObject").expect("xobjects"))
            .expect("resolve")
            .as_dict()
            .expect("dict")
            .clone();
        let form_id = xobjects
            .get(name.as_bytes())
            .and_then(Object::as_reference)
            .expect("form ref");
        doc.get_object(form_id)
            .and_then(Object::as_stream)
            .expect("form stream")
            .clone()
    }

    #[test]
    fn overlay_is_drawn_on_target_page_only() {
        let template = sample_pdf(&[(612, 792), (612, 792)]);
        let before = load_document(&template).expect("load template");
        let untouched = page_content(&before, 1);

        let overlay = overlay_for(PageGeometry::new(612.0, 792.0));
        let merged = merge_overlay(&template, &overlay, 0).expect("merge");
        let doc = load_document(&merged).expect("load merged");

        assert_eq!(doc.get_pages().len(), 2);
        let first = page_content(&doc, 0);
        assert!(first.starts_with("q"));
        assert!(first.contains("(Page 1) Tj"));
        assert!(first.contains("/ProofOverlay Do"));
        assert_eq!(page_content(&doc, 1), untouched);

        let form = form_for(&doc, 0, "ProofOverlay");
        assert_eq!(
            form.dict.get(b"Subtype").and_then(Object::as_name_str).expect("subtype"),
            "Form"
        );
        let form_resources = resolve(&doc, form.dict.get(b"Resources").expect("resources"))
            .expect("resolve")
            .as_dict()
            .expect("dict")
            .clone();
        assert!(form_resources.has(b"Font"));
    }

    #[test]
    fn inherited_page_resources_are_kept() {
        let template = sample_pdf(&[(612, 792)]);
        let overlay = overlay_for(PageGeometry::new(612.0, 792.0));
        let merged = merge_overlay(&template, &overlay, 0).expect("merge");
        let doc = load_document(&merged).expect("load merged");
        let id = page_id(&doc, 0).expect("page id");
        let resources = effective_resources(&doc, id).expect("resources");
        let fonts = resolve(&doc, resources.get(b"Font").expect("fonts"))
            .expect("resolve")
            .as_dict()
            .expect("dict")
            .clone();
        assert!(fonts.has(b"F1"));
    }

    #[test]
    fn picks_a_free_xobject_name() {
        let mut xobjects = Dictionary::new();
        xobjects.set("ProofOverlay", Object::Null);
        xobjects.set("ProofOverlay1", Object::Null);
        assert_eq!(unused_name(&xobjects), "ProofOverlay2");
        assert_eq!(unused_name(&Dictionary::new()), "ProofOverlay");
    }

    #[test]
    fn form_is_offset_by_page_box_origin() {
        let template = sample_pdf(&[(612, 792)]);
        let mut doc = load_document(&template).expect("load");
        let id = page_id(&doc, 0).expect("page id");
        doc.get_dictionary_mut(id)
            .expect("page")
            .set("CropBox", integer_array(&[36, 72, 576, 720]));
        let mut shifted = Vec::new();
        doc.save_to(&mut shifted).expect("save");

        let overlay = overlay_for(PageGeometry::new(540.0, 648.0));
        let merged = merge_overlay(&shifted, &overlay, 0).expect("merge");
        let doc = load_document(&merged).expect("load merged");
        let form = form_for(&doc, 0, "ProofOverlay");
        let matrix = form
            .dict
            .get(b"Matrix")
            .and_then(Object::as_array)
            .expect("matrix")
            .clone();
        assert_eq!(matrix.len(), 6);
        assert_eq!(matrix[4].as_float().expect("tx"), 36.0);
        assert_eq!(matrix[5].as_float().expect("ty"), 72.0);
    }

    #[test]
    fn missing_target_page_is_an_error() {
        let template = sample_pdf(&[(612, 792)]);
        let overlay = overlay_for(PageGeometry::new(612.0, 792.0));
        let err = merge_overlay(&template, &overlay, 4).expect_err("no page 5");
        assert!(err.to_string().contains("page 5 not found"));
    }

    #[test]
    fn broken_overlay_is_reported() {
        let template = sample_pdf(&[(612, 792)]);
        let err = merge_overlay(&template, b"not a pdf", 0).expect_err("bad overlay");
        assert!(format!("{:#}", err).contains("failed to read overlay pdf"));
    }
}
