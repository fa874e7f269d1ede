//! User-agent classification feeding the per-bucket platform, browser and
//! device counters. Substring matching is deliberately coarse; unknown
//! agents land in the `Other` buckets rather than being dropped.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Mac,
    Linux,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Browser {
    Chrome,
    Firefox,
    Safari,
    Edge,
    Ie,
    Opera,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Mobile,
    Tablet,
    Desktop,
}

/// Classify a raw user-agent string.
pub fn classify(user_agent: &str) -> (Platform, Browser, Device) {
    let ua = user_agent.to_lowercase();
    (platform(&ua), browser(&ua), device(&ua))
}

fn platform(ua: &str) -> Platform {
    // Android reports "Linux" in its UA; treat it as Other, not Linux.
    if ua.contains("android") {
        return Platform::Other;
    }
    if ua.contains("windows") {
        Platform::Windows
    } else if ua.contains("mac os") || ua.contains("macintosh") {
        Platform::Mac
    } else if ua.contains("linux") || ua.contains("x11") {
        Platform::Linux
    } else {
        Platform::Other
    }
}

fn browser(ua: &str) -> Browser {
    // Order matters: Chrome UAs contain "safari", Edge and Opera UAs
    // contain "chrome".
    if ua.contains("edg") {
        Browser::Edge
    } else if ua.contains("opr") || ua.contains("opera") {
        Browser::Opera
    } else if ua.contains("msie") || ua.contains("trident") {
        Browser::Ie
    } else if ua.contains("firefox") || ua.contains("fxios") {
        Browser::Firefox
    } else if ua.contains("chrome") || ua.contains("crios") {
        Browser::Chrome
    } else if ua.contains("safari") {
        Browser::Safari
    } else {
        Browser::Other
    }
}

fn device(ua: &str) -> Device {
    // Android tablets carry "android" without "mobile".
    if ua.contains("ipad") || ua.contains("tablet") || (ua.contains("android") && !ua.contains("mobile"))
    {
        Device::Tablet
    } else if ua.contains("mobi") || ua.contains("iphone") || ua.contains("android") {
        Device::Mobile
    } else {
        Device::Desktop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
    const FIREFOX_LINUX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
    const SAFARI_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15";
    const EDGE_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36 Edg/126.0.0.0";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1";
    const CHROME_ANDROID_PHONE: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Mobile Safari/537.36";
    const CHROME_ANDROID_TABLET: &str = "Mozilla/5.0 (Linux; Android 14; SM-X910) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

    #[test]
    fn test_desktop_browsers() {
        assert_eq!(
            classify(CHROME_WIN),
            (Platform::Windows, Browser::Chrome, Device::Desktop)
        );
        assert_eq!(
            classify(FIREFOX_LINUX),
            (Platform::Linux, Browser::Firefox, Device::Desktop)
        );
        assert_eq!(
            classify(SAFARI_MAC),
            (Platform::Mac, Browser::Safari, Device::Desktop)
        );
    }

    #[test]
    fn test_edge_not_misread_as_chrome() {
        assert_eq!(classify(EDGE_WIN).1, Browser::Edge);
    }

    #[test]
    fn test_mobile_devices() {
        assert_eq!(classify(SAFARI_IPHONE).2, Device::Mobile);
        assert_eq!(classify(CHROME_ANDROID_PHONE).2, Device::Mobile);
        assert_eq!(classify(CHROME_ANDROID_TABLET).2, Device::Tablet);
    }

    #[test]
    fn test_android_platform_is_other() {
        assert_eq!(classify(CHROME_ANDROID_PHONE).0, Platform::Other);
    }

    #[test]
    fn test_unknown_agent_falls_through() {
        assert_eq!(
            classify("curl/8.5.0"),
            (Platform::Other, Browser::Other, Device::Desktop)
        );
    }
}
