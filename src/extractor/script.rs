/// Collects every element category in one pass. Returns the `PageSnapshot`
/// shape directly so it can be deserialized without reshaping.
pub const SNAPSHOT_SCRIPT: &str = r#"
(function() {
    function describe(el) {
        var attributes = {};
        for (var i = 0; i < el.attributes.length; i++) {
            var attr = el.attributes[i];
            attributes[attr.name] = attr.value;
        }
        return {
            tagName: el.tagName.toLowerCase(),
            attributes: attributes,
            textContent: (el.textContent || '').trim(),
            innerHTML: el.innerHTML || ''
        };
    }
    function collect(selector) {
        return Array.from(document.querySelectorAll(selector)).map(describe);
    }
    return {
        title: document.title || '',
        url: window.location.href,
        images: collect('img'),
        links: collect('a'),
        buttons: collect('button, input[type="button"], input[type="submit"]'),
        forms: collect('form'),
        headings: collect('h1, h2, h3, h4, h5, h6'),
        inputs: collect('input, select, textarea')
    };
})()
"#;

/// Cheap probe polled while waiting for the network to settle.
pub const IDLE_PROBE_SCRIPT: &str = r#"
(function() {
    return {
        readyState: document.readyState,
        resources: performance.getEntriesByType('resource').length
    };
})()
"#;
