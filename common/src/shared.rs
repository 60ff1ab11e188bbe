use std::sync::Arc;

use tokio::sync::Mutex;

/// Async-locked value shared between the runtime loop and spawned tasks.
#[derive(Debug)]
pub struct Shared<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    pub async fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock().await;
        f(&mut guard)
    }

    pub async fn snapshot(&self) -> T
    where
        T: Clone,
    {
        self.inner.lock().await.clone()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> std::ops::Deref for Shared<T> {
    type Target = Mutex<T>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> From<T> for Shared<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Default> Default for Shared<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_see_the_same_value() {
        let counter = Shared::new(0_u32);
        let other = counter.clone();
        assert!(counter.ptr_eq(&other));

        other.with(|value| *value += 3).await;
        assert_eq!(counter.snapshot().await, 3);

        *counter.lock().await = 10;
        assert_eq!(other.with(|value| *value).await, 10);
    }
}
