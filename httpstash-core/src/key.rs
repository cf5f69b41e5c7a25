//! Cache key generation.

/// Derives a stable cache key from a request.
///
/// Two requests that should share a cached response must produce the same key.
/// Closures of the form `Fn(&Req) -> String` implement this trait.
pub trait KeyGenerator<Req: ?Sized>: Send + Sync {
    /// Returns the cache key for `request`.
    fn create_key(&self, request: &Req) -> String;
}

impl<Req, F> KeyGenerator<Req> for F
where
    Req: ?Sized,
    F: Fn(&Req) -> String + Send + Sync,
{
    fn create_key(&self, request: &Req) -> String {
        self(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_key_generator() {
        let generator = |request: &str| format!("key:{}", request.len());
        assert_eq!(generator.create_key("abc"), "key:3");
    }
}
