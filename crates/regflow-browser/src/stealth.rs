//! Anti-detection init script.
//!
//! Built per session from the fingerprint and installed via
//! `context.addInitScript`, so it runs before any page script. The shims
//! mask the automation flag, normalize plugin/language/hardware reporting,
//! add low-amplitude noise to canvas and audio readouts, and spoof the
//! WebGL vendor/renderer strings to match the fingerprint.

use regflow_models::Fingerprint;

pub fn build_stealth_script(fingerprint: &Fingerprint) -> String {
    let languages = serde_json::to_string(&fingerprint.languages)
        .unwrap_or_else(|_| "[\"en-US\",\"en\"]".to_string());
    let platform = serde_json::to_string(&fingerprint.platform).unwrap_or_default();
    let vendor = serde_json::to_string(&fingerprint.vendor).unwrap_or_default();
    let webgl_vendor = serde_json::to_string(&fingerprint.webgl_vendor).unwrap_or_default();
    let webgl_renderer = serde_json::to_string(&fingerprint.webgl_renderer).unwrap_or_default();

    let mut script = String::new();

    script.push_str("(() => {\n");

    // Automation flag.
    script.push_str(
        "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });\n",
    );
    script.push_str("delete Object.getPrototypeOf(navigator).webdriver;\n");

    // Navigator surface aligned with the fingerprint.
    script.push_str(&format!(
        "Object.defineProperty(navigator, 'platform', {{ get: () => {platform} }});\n"
    ));
    script.push_str(&format!(
        "Object.defineProperty(navigator, 'vendor', {{ get: () => {vendor} }});\n"
    ));
    script.push_str(&format!(
        "Object.defineProperty(navigator, 'languages', {{ get: () => {languages} }});\n"
    ));
    script.push_str(&format!(
        "Object.defineProperty(navigator, 'hardwareConcurrency', {{ get: () => {} }});\n",
        fingerprint.hardware_concurrency
    ));
    script.push_str(&format!(
        "Object.defineProperty(navigator, 'deviceMemory', {{ get: () => {} }});\n",
        fingerprint.device_memory_gb
    ));

    // Headless Chromium reports an empty plugin list.
    script.push_str(
        "Object.defineProperty(navigator, 'plugins', { get: () => [\n\
         { name: 'PDF Viewer' }, { name: 'Chrome PDF Viewer' }, { name: 'Chromium PDF Viewer' }\n\
         ] });\n",
    );

    // Permissions.query for notifications mirrors a real profile.
    script.push_str(
        "const nativeQuery = window.navigator.permissions.query.bind(window.navigator.permissions);\n\
         window.navigator.permissions.query = (parameters) =>\n\
           parameters && parameters.name === 'notifications'\n\
             ? Promise.resolve({ state: Notification.permission })\n\
             : nativeQuery(parameters);\n",
    );

    // WebGL vendor/renderer spoof (UNMASKED_VENDOR_WEBGL / UNMASKED_RENDERER_WEBGL).
    script.push_str(&format!(
        "const patchGl = (proto) => {{\n\
           const native = proto.getParameter;\n\
           proto.getParameter = function (parameter) {{\n\
             if (parameter === 37445) return {webgl_vendor};\n\
             if (parameter === 37446) return {webgl_renderer};\n\
             return native.call(this, parameter);\n\
           }};\n\
         }};\n\
         if (window.WebGLRenderingContext) patchGl(WebGLRenderingContext.prototype);\n\
         if (window.WebGL2RenderingContext) patchGl(WebGL2RenderingContext.prototype);\n",
    ));

    // Benign noise on canvas readouts.
    script.push_str(
        "const nativeToDataURL = HTMLCanvasElement.prototype.toDataURL;\n\
         HTMLCanvasElement.prototype.toDataURL = function (...args) {\n\
           const ctx = this.getContext('2d');\n\
           if (ctx && this.width > 4 && this.height > 4) {\n\
             const image = ctx.getImageData(0, 0, 2, 2);\n\
             image.data[0] = image.data[0] ^ 1;\n\
             ctx.putImageData(image, 0, 0);\n\
           }\n\
           return nativeToDataURL.apply(this, args);\n\
         };\n",
    );

    // And on audio fingerprinting surfaces.
    script.push_str(
        "if (window.AudioBuffer) {\n\
           const nativeGetChannelData = AudioBuffer.prototype.getChannelData;\n\
           AudioBuffer.prototype.getChannelData = function (...args) {\n\
             const data = nativeGetChannelData.apply(this, args);\n\
             for (let i = 0; i < data.length; i += 500) {\n\
               data[i] = data[i] + (Math.random() - 0.5) * 1e-7;\n\
             }\n\
             return data;\n\
           };\n\
         }\n",
    );

    // window.chrome exists on real Chrome profiles.
    script.push_str(
        "if (!window.chrome) {\n\
           Object.defineProperty(window, 'chrome', { value: { runtime: {} }, writable: false });\n\
         }\n",
    );

    script.push_str("})();\n");
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::FingerprintGenerator;

    #[test]
    fn script_embeds_fingerprint_values() {
        let fp = FingerprintGenerator::new().generate();
        let script = build_stealth_script(&fp);

        assert!(script.contains("'webdriver'"));
        assert!(script.contains(&fp.platform));
        assert!(script.contains(&fp.webgl_renderer));
        assert!(script.contains(&fp.hardware_concurrency.to_string()));
        // Renderer strings contain no raw quotes that would break the JS.
        assert!(!fp.webgl_renderer.contains('"'));
    }
}
