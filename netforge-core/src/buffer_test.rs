#[cfg(test)]
mod tests {
    use crate::buffer::{element_count, Buffer, BufferArena};
    use crate::error::NetForgeError;

    #[test]
    fn test_scalar_shape_counts_one_element() {
        assert_eq!(element_count(&[]), 1);
        assert_eq!(element_count(&[2, 0, 3]), 0);
        let b = Buffer::<f32>::new(&[]);
        assert_eq!(b.count(), 1);
        assert_eq!(b.value(), &[0.0]);
    }

    #[test]
    fn test_reshape_capacity_is_sticky() {
        let mut b = Buffer::<f32>::new(&[2, 3]);
        assert_eq!(b.capacity(), 6);
        b.value_mut()[0] = 7.0;

        b.reshape(&[2]);
        assert_eq!(b.count(), 2);
        assert_eq!(b.capacity(), 6);
        // No reallocation, so previous contents survive a shrink.
        assert_eq!(b.value()[0], 7.0);

        b.reshape(&[4, 4]);
        assert_eq!(b.capacity(), 16);
        assert_eq!(b.grad().len(), 16);
    }

    #[test]
    fn test_from_vec_length_mismatch() {
        let err = Buffer::<f64>::from_vec(vec![1.0, 2.0, 3.0], &[2, 2]).unwrap_err();
        assert!(matches!(err, NetForgeError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_shared_value_writes_are_visible_through_both_handles() -> Result<(), NetForgeError> {
        let mut arena = BufferArena::<f32>::new();
        let owner = arena.push(Buffer::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2])?);
        let view = arena.push(Buffer::new(&[4]));

        arena.share_value(view, owner)?;
        assert!(arena.is_value_shared(view));
        assert!(!arena.is_grad_shared(view));
        assert_eq!(arena.value(view), &[1.0, 2.0, 3.0, 4.0]);

        arena.value_mut(view)[1] = 20.0;
        assert_eq!(arena.value(owner)[1], 20.0);

        // Gradients remain independent until shared explicitly.
        arena.grad_mut(view)[0] = 5.0;
        assert_eq!(arena.grad(owner)[0], 0.0);

        arena.share_grad(view, owner)?;
        arena.grad_mut(owner)[3] = 9.0;
        assert_eq!(arena.grad(view)[3], 9.0);
        Ok(())
    }

    #[test]
    fn test_share_requires_equal_count() {
        let mut arena = BufferArena::<f32>::new();
        let a = arena.push(Buffer::new(&[3]));
        let b = arena.push(Buffer::new(&[4]));
        assert!(arena.share_value(a, b).is_err());
        assert!(arena.share_grad(a, b).is_err());
    }

    #[test]
    fn test_alias_chains_resolve_to_canonical_owner() -> Result<(), NetForgeError> {
        let mut arena = BufferArena::<f64>::new();
        let a = arena.push(Buffer::new(&[2]));
        let b = arena.push(Buffer::new(&[2]));
        let c = arena.push(Buffer::new(&[1, 2]));
        arena.share_value(b, a)?;
        arena.share_value(c, b)?;
        assert_eq!(arena.value_owner(c), a);
        arena.value_mut(c)[0] = 3.5;
        assert_eq!(arena.value(a)[0], 3.5);
        Ok(())
    }

    #[test]
    fn test_reshape_of_alias_cannot_outgrow_owner() -> Result<(), NetForgeError> {
        let mut arena = BufferArena::<f32>::new();
        let owner = arena.push(Buffer::new(&[2, 2]));
        let view = arena.push(Buffer::new(&[4]));
        arena.share_value(view, owner)?;
        arena.reshape(view, &[1, 4])?;
        assert_eq!(arena.shape(view), &[1, 4]);
        assert!(arena.reshape(view, &[5]).is_err());
        Ok(())
    }

    #[test]
    fn test_asum_and_snapshot() -> Result<(), NetForgeError> {
        let mut arena = BufferArena::<f32>::new();
        let id = arena.push(Buffer::from_vec(vec![-1.0, 2.0, -3.0], &[3])?);
        assert_eq!(arena.asum_value(id), 6.0);
        assert_eq!(arena.sumsq_value(id), 14.0);
        arena.fill_grad(id, 0.5);
        assert_eq!(arena.asum_grad(id), 1.5);
        let copy = arena.snapshot(id);
        assert_eq!(copy.value(), &[-1.0, 2.0, -3.0]);
        assert_eq!(copy.grad(), &[0.5, 0.5, 0.5]);
        Ok(())
    }

    /// Only asks for `Debug` on the element type.
    fn describe<T: std::fmt::Debug>(arena: &BufferArena<T>) -> String {
        format!("{:?}", arena)
    }

    #[test]
    fn test_debug_formats_shapes_not_values() -> Result<(), NetForgeError> {
        let mut arena = BufferArena::<f64>::new();
        arena.push(Buffer::from_vec(vec![1.5, 2.5], &[2])?);
        let text = describe(&arena);
        assert!(text.contains("shape: [2]"));
        assert!(!text.contains("1.5"));
        Ok(())
    }
}
