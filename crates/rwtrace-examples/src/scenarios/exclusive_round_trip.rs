use crate::LockFactory;

pub fn run(factory: LockFactory) -> Result<(), String> {
    let lock = factory.build("");

    lock.write_lock();
    println!("holding the unlabelled lock exclusively");
    // SAFETY: taken exclusively just above on this thread.
    unsafe { lock.write_unlock() };

    println!("done: expect one `obtaining lock` and one `releasing lock` trace on stderr");
    Ok(())
}
